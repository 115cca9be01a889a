// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated frame loop that exercises the scheduler and its diagnostics.
//!
//! Runs 120 synthetic frames (with jitter and one long stall) through a
//! [`Scheduler`], fanning pass events out to a
//! [`PrettyPrintSink`](metronome_debug::pretty::PrettyPrintSink), a
//! [`RecorderSink`](metronome_debug::recorder::RecorderSink) and a
//! [`LogSink`](metronome_debug::log::LogSink), then exports a Chrome trace
//! JSON file.
//!
//! Set `RUST_LOG=metronome=trace` to see every forwarded event.

use std::fs::File;
use std::io::BufWriter;

use metronome_core::callback::CallbackError;
use metronome_core::config::{FaultPolicy, SchedulerConfig};
use metronome_core::scheduler::Scheduler;
use metronome_core::trace::{
    PassBeginEvent, PassSummary, TimerFaultEvent, TimerFiredEvent, TimerRetiredEvent, TraceSink,
    Tracer,
};
use metronome_debug::log::LogSink;
use metronome_debug::pretty::PrettyPrintSink;
use metronome_debug::recorder::RecorderSink;
use tracing::info;

const FRAME_COUNT: u32 = 120;
/// Nominal 60 Hz frame delta.
const FRAME_DT: f32 = 1.0 / 60.0;
/// Frame that stalls, to show residual drift being dropped.
const STALL_FRAME: u32 = 45;

type DemoScheduler = Scheduler<&'static str, u32>;

/// Forwards every event to several sinks.
struct Tee<'a> {
    sinks: Vec<&'a mut dyn TraceSink>,
}

impl std::fmt::Debug for Tee<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tee")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl TraceSink for Tee<'_> {
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        self.sinks.iter_mut().for_each(|s| s.on_pass_begin(e));
    }

    fn on_timer_fired(&mut self, e: &TimerFiredEvent) {
        self.sinks.iter_mut().for_each(|s| s.on_timer_fired(e));
    }

    fn on_timer_fault(&mut self, e: &TimerFaultEvent) {
        self.sinks.iter_mut().for_each(|s| s.on_timer_fault(e));
    }

    fn on_timer_retired(&mut self, e: &TimerRetiredEvent) {
        self.sinks.iter_mut().for_each(|s| s.on_timer_retired(e));
    }

    fn on_pass_summary(&mut self, s: &PassSummary) {
        self.sinks.iter_mut().for_each(|sink| sink.on_pass_summary(s));
    }
}

/// Deterministic jitter around the nominal delta.
fn frame_dt(frame: u32) -> f32 {
    if frame == STALL_FRAME {
        return 0.2;
    }
    let jitter = [0.0, 0.0008, -0.0005, 0.0012, -0.001];
    FRAME_DT + jitter[frame as usize % jitter.len()]
}

fn register_timers(scheduler: &mut DemoScheduler) {
    // Unbounded heartbeat, param counts beats.
    scheduler.schedule("heartbeat", 0.5, 0, 0, |_, _, beats| {
        *beats += 1;
        info!(beats = *beats, "heartbeat");
    });

    // Bounded spawner: each firing queues a one-shot follow-up for the next
    // frame. The last firing knows it is the last one.
    scheduler.schedule("spawner", 0.25, 3, 0, |s: &mut DemoScheduler, _, wave| {
        *wave += 1;
        let last = s.last_fired_remaining() == 0;
        info!(wave = *wave, last, "spawning wave");
        s.schedule_once("wave_settled", *wave, |_, _, wave| {
            info!(wave = *wave, "wave settled");
        });
    });

    // Fails on its third run; the contain policy cancels it and the pass
    // carries on.
    scheduler.schedule("flaky", 0.3, 0, 0, |_, _, runs| {
        *runs += 1;
        if *runs == 3 {
            return Err(CallbackError::new("sensor went away"));
        }
        Ok(())
    });

    // Every-tick watcher that cancels itself after 90 frames.
    scheduler.schedule_every_tick("watchdog", 0, |s: &mut DemoScheduler, key, frames| {
        *frames += 1;
        if *frames == 90 {
            info!("watchdog done");
            s.cancel(key);
        }
    });
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // -- sinks -------------------------------------------------------------
    let mut pretty = PrettyPrintSink::with_writer(std::io::stdout()).summary_only(true);
    let mut recorder = RecorderSink::new();
    let mut log = LogSink;

    // -- scheduler ---------------------------------------------------------
    let config = SchedulerConfig::new()
        .with_fault_policy(FaultPolicy::Contain)
        .with_capacity(8);
    let mut scheduler = DemoScheduler::new(config);
    register_timers(&mut scheduler);

    // -- simulated loop ----------------------------------------------------
    {
        let mut tee = Tee {
            sinks: vec![
                &mut pretty as &mut dyn TraceSink,
                &mut recorder as &mut dyn TraceSink,
                &mut log as &mut dyn TraceSink,
            ],
        };
        for frame in 0..FRAME_COUNT {
            let mut tracer = Tracer::new(&mut tee);
            if let Err(err) = scheduler.advance_traced(frame_dt(frame), &mut tracer) {
                tracing::error!(%err, frame, "pass aborted");
            }
        }
    }

    let retired = scheduler
        .shutdown()
        .expect("shutdown is only rejected from inside a callback");
    info!(
        retired,
        pooled = scheduler.pooled_len(),
        clock_secs = scheduler.clock_secs(),
        "scheduler shut down"
    );

    // -- export Chrome trace -----------------------------------------------
    let path = "frame_loop_trace.json";
    let file = File::create(path).expect("failed to create trace file");
    let mut writer = BufWriter::new(file);
    metronome_debug::chrome::export(recorder.as_bytes(), &mut writer)
        .expect("failed to write Chrome trace");

    println!("Wrote {path} ({FRAME_COUNT} frames)");
}
