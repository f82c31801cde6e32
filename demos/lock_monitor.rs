//! Lock monitor example
//!
//! Run with: cargo run --example lock_monitor
//!
//! Set `RUST_LOG=qbike_lock_ble=debug` to see every exchange cycle.

use qbike_lock_ble::{ConnectionPhase, ControllerConfig, LockController, Result};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qbike_lock_ble=info".into()),
        )
        .init();

    println!("QBike Lock Monitor");
    println!("==================\n");
    println!("Looking for the lock...\n");

    let controller = LockController::with_platform(ControllerConfig::default()).await?;
    controller.trigger_scan_and_connect().await?;

    let mut state = controller.state();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting...");
                break;
            }
            changed = state.changed() => {
                let Some(snapshot) = changed else {
                    break;
                };

                match snapshot.phase {
                    ConnectionPhase::Connected => println!(
                        "{:<12} {:<16} indicator: {:<6} cycles: {} ok / {} failed",
                        snapshot.phase,
                        snapshot.peripheral_name().unwrap_or_default(),
                        snapshot.color,
                        snapshot.completed_cycles,
                        snapshot.failed_cycles,
                    ),
                    ConnectionPhase::Idle => {
                        if let Some(error) = &snapshot.last_error {
                            println!("idle (last error: {})", error);
                        } else {
                            println!("idle");
                        }
                    }
                    phase => println!("{}", phase),
                }
            }
        }
    }

    controller.shutdown().await?;

    Ok(())
}
