use clap::Parser;
use rustdmp_core::map::IndexPolicy;
use rustdmp_device::SimulatedDevice;
use rustdmp_session::{MemberHandle, UdpSession};
use rustdmp_tools::{parse_hex, DeviceDescription};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "dmp-simulator")]
struct Args {
    /// Device description JSON.
    description: PathBuf,
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    ip: IpAddr,
    #[arg(long, default_value_t = MemberHandle::DMP_DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let desc = DeviceDescription::load(&args.description)?;
    let map = Arc::new(desc.build_map(IndexPolicy::default())?);

    let session = UdpSession::bind(SocketAddr::new(args.ip, args.port)).await?;
    let local = session.local_addr()?;
    let mut sim = SimulatedDevice::new(map.clone(), session);
    for initial in &desc.values {
        sim.set_value(initial.address, parse_hex(&initial.value)?)?;
    }

    println!(
        "Simulated device {} on {local} ({} properties). Ctrl+C to stop.",
        desc.name.as_deref().unwrap_or("(unnamed)"),
        map.len()
    );
    sim.run().await?;
    Ok(())
}
