use clap::Parser;
use rustdmp_core::address::AddressSpec;
use rustdmp_core::map::IndexPolicy;
use rustdmp_device::Controller;
use rustdmp_session::{MemberHandle, UdpSession};
use rustdmp_tools::{parse_adspec, parse_hex, DeviceDescription};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "dmp-setprop")]
struct Args {
    /// Device description JSON of the target.
    description: PathBuf,
    /// Addresses to write, as base or base:increment:count.
    #[arg(value_parser = parse_adspec)]
    address: AddressSpec,
    /// Hex value per address, or one value for all of them.
    #[arg(long = "value", required = true)]
    values: Vec<String>,
    #[arg(long)]
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
    let session = UdpSession::bind("0.0.0.0:0".parse()?).await?;
    let controller = Controller::new(session, map);
    let device = MemberHandle::Ip(SocketAddr::new(args.ip, args.port));

    let values = args
        .values
        .iter()
        .map(|v| parse_hex(v))
        .collect::<Result<Vec<_>, _>>()?;
    let values: Vec<&[u8]> = values.iter().map(Vec::as_slice).collect();
    if let Err(e) = controller.set(device, args.address, &values) {
        eprintln!("set failed: {e}");
        std::process::exit(1);
    }
    controller.session().flush().await?;
    println!("sent");
    Ok(())
}
