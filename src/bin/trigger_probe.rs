//! Trigger Device Probe
//!
//! Opens the gun controller's serial port and prints every line it sends,
//! flagging the ones that decode as trigger or ready sentences. Useful for
//! checking wiring and baud rate before running the full pipeline.

use clap::Parser;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_serial::SerialPortBuilderExt;

const GUN_A_SENTENCE: &str = "ir laser fired from gun a";
const GUN_B_SENTENCE: &str = "ir laser fired from gun b";
const READY_SENTENCE: &str = "ready";

#[derive(Parser, Debug)]
#[command(name = "trigger_probe", about = "Serial trigger device probe")]
struct Args {
    #[arg(long, default_value = "/dev/ttyUSB0")]
    device: String,

    #[arg(long, default_value = "115200")]
    baud: u32,

    /// Delay after opening the port so the microcontroller can reset (ms)
    #[arg(long, default_value = "2000")]
    settle_ms: u64,
}

fn classify(line: &str) -> &'static str {
    let line = line.to_ascii_lowercase();
    if line.contains(GUN_A_SENTENCE) {
        "TRIGGER gun=a"
    } else if line.contains(GUN_B_SENTENCE) {
        "TRIGGER gun=b"
    } else if line.contains(READY_SENTENCE) {
        "READY"
    } else {
        "-"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("Opening {} @ {} baud", args.device, args.baud);
    let port = tokio_serial::new(&args.device, args.baud)
        .timeout(Duration::from_millis(1000))
        .open_native_async()?;

    if args.settle_ms > 0 {
        println!("Waiting {}ms for device reset...", args.settle_ms);
        tokio::time::sleep(Duration::from_millis(args.settle_ms)).await;
    }
    println!("Listening (Ctrl-C to stop)");

    let mut reader = BufReader::new(port);
    let mut line = String::new();

    loop {
        line.clear();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nDone");
                return Ok(());
            }
            read = reader.read_line(&mut line) => {
                match read {
                    Ok(0) => {
                        println!("Serial stream closed");
                        return Ok(());
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            println!("[{}] {}", classify(trimmed), trimmed);
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::TimedOut => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
}
