//! Parent/child cohort demo.
//!
//! The parent binds a sync gate, spawns three child copies of this binary,
//! and supervises them; every child parks until the parent releases the
//! cohort, runs a chatty task for a random number of ticks, then exits. The
//! parent's fan-in watch notices once no child is alive and winds the whole
//! thing down.
//!
//! Run with `cargo run --example cohort_demo`.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use cohort::{
    channel, Bus, Config, HandlerRef, LogLevel, OsChild, Process, Supervisor, SyncGate,
    SyncWaiter, Task, TaskError, DEFAULT_PRIORITY,
};

const ROLE_VAR: &str = "COHORT_DEMO_ROLE";
const GATE_VAR: &str = "COHORT_DEMO_GATE";
const CHILDREN: usize = 3;

/// Logs its own lifecycle; stands in for real application work.
struct Chatty;

#[async_trait]
impl Task for Chatty {
    fn name(&self) -> &str {
        "chatty"
    }

    async fn on_start(&self, bus: &Bus) -> Result<(), TaskError> {
        bus.log(LogLevel::Info, "chatty task starting").await;
        Ok(())
    }

    async fn on_stop(&self, bus: &Bus) -> Result<(), TaskError> {
        bus.log(LogLevel::Info, "chatty task stopping").await;
        Ok(())
    }
}

/// Exits the bus after a randomly chosen number of `main` ticks, so each
/// child lives a slightly different lifetime.
struct RandomLifetime;

#[async_trait]
impl Task for RandomLifetime {
    fn name(&self) -> &str {
        "random-lifetime"
    }

    async fn on_start(&self, bus: &Bus) -> Result<(), TaskError> {
        struct Countdown {
            remaining: AtomicUsize,
        }

        #[async_trait]
        impl cohort::Handler for Countdown {
            async fn on_event(
                &self,
                bus: &Bus,
                _event: &cohort::Event,
            ) -> Result<(), TaskError> {
                if self.remaining.fetch_sub(1, Ordering::SeqCst) <= 1 {
                    bus.log(LogLevel::Info, "lifetime elapsed, exiting").await;
                    bus.exit().await;
                }
                Ok(())
            }
        }

        let ticks = 10 + (rand::random::<usize>() % 40);
        bus.log(LogLevel::Info, format!("living for {ticks} ticks"))
            .await;
        let countdown: HandlerRef = Arc::new(Countdown {
            remaining: AtomicUsize::new(ticks),
        });
        bus.subscribe(channel::MAIN, &countdown, DEFAULT_PRIORITY);
        Ok(())
    }
}

async fn run_parent(cfg: Config) -> Result<(), Box<dyn Error>> {
    let gate = SyncGate::bind("127.0.0.1:0".parse()?).await?;
    let gate_addr = gate.local_addr();
    let process = Process::synchronizing(cfg, gate);

    let supervisor = Arc::new(Supervisor::new());
    process.register_task(supervisor.clone()).await;

    let own_binary = std::env::current_exe()?;
    for _ in 0..CHILDREN {
        let mut command = Command::new(&own_binary);
        command
            .env(ROLE_VAR, "child")
            .env(GATE_VAR, gate_addr.to_string());
        let child = OsChild::spawn(&mut command)?;
        process.track_child(child.clone()).await;
        supervisor.supervise(child).await;
    }

    process.run().await?;
    Ok(())
}

async fn run_child(cfg: Config, gate_addr: SocketAddr) -> Result<(), Box<dyn Error>> {
    let process = Process::synchronized(cfg, Arc::new(SyncWaiter::new(gate_addr)));
    process.register_task(Arc::new(Chatty)).await;
    process.register_task(Arc::new(RandomLifetime)).await;
    process.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let cfg = Config {
        interval: Duration::from_millis(100),
        sync_delay: Duration::from_secs(1),
        ..Config::default()
    };

    match std::env::var(ROLE_VAR).as_deref() {
        Ok("child") => {
            let gate_addr: SocketAddr = std::env::var(GATE_VAR)?.parse()?;
            run_child(cfg, gate_addr).await
        }
        _ => run_parent(cfg).await,
    }
}
