// ABOUTME: Standalone CLI that connects to a CPX streamer peer and logs frame/FPS statistics
// ABOUTME: Demonstrates wiring ctrl_c into Streamer::shutdown for a clean exit

use cpx::streamer::FrameStats;
use cpx::Streamer;
use std::error::Error;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "192.168.4.1".to_string());
    let port: u16 = args.next().and_then(|s| s.parse().ok()).unwrap_or(5000);

    println!("connecting to {host}:{port}");
    let streamer = Streamer::connect(&host, port).await?;

    let mut stats = FrameStats::new();
    let mut report_timer = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            frame = streamer.receive() => {
                match frame {
                    Ok(Some((_grid, _tof, metadata))) => {
                        stats.push(&metadata);
                        if let Err(err) = streamer.send_reply(&metadata, None).await {
                            eprintln!("failed to send reply buffer: {err}");
                        }
                    }
                    Ok(None) => {
                        println!("streamer closed, exiting");
                        break;
                    }
                    Err(err) => {
                        eprintln!("fatal streamer error: {err}");
                        break;
                    }
                }
            }
            _ = report_timer.tick() => {
                if let Some(report) = stats.report() {
                    println!(
                        "fps={:.1} rtt_ms={:.1} dropped={} total={}",
                        report.fps, report.rtt_ms, report.dropped, report.total
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("received interrupt, shutting down");
                break;
            }
        }
    }

    streamer.shutdown().await;
    Ok(())
}
