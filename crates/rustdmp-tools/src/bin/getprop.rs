use clap::Parser;
use rustdmp_core::address::AddressSpec;
use rustdmp_core::map::IndexPolicy;
use rustdmp_device::Controller;
use rustdmp_session::{MemberHandle, UdpSession};
use rustdmp_tools::{format_hex, parse_adspec, DeviceDescription};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "dmp-getprop")]
struct Args {
    /// Device description JSON of the target.
    description: PathBuf,
    /// Addresses to read, as base or base:increment:count.
    #[arg(value_parser = parse_adspec)]
    address: AddressSpec,
    #[arg(long)]
    ip: IpAddr,
    #[arg(long, default_value_t = MemberHandle::DMP_DEFAULT_PORT)]
    port: u16,
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,
    /// Print values as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let desc = DeviceDescription::load(&args.description)?;
    let map = Arc::new(desc.build_map(IndexPolicy::default())?);
    let session = UdpSession::bind("0.0.0.0:0".parse()?).await?;
    let controller = Controller::new(session, map)
        .with_response_timeout(Duration::from_millis(args.timeout_ms));
    let device = MemberHandle::Ip(SocketAddr::new(args.ip, args.port));

    match controller.get(device, args.address).await {
        Ok(values) if args.json => {
            let out: Vec<_> = values
                .iter()
                .map(|(address, value)| {
                    serde_json::json!({ "address": address, "value": format_hex(value) })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Ok(values) => {
            for (address, value) in values {
                println!("{address}: {}", format_hex(&value));
            }
        }
        Err(e) => {
            eprintln!("get failed: {e}");
            std::process::exit(1);
        }
    }
    Ok(())
}
