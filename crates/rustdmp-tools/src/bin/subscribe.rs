use clap::Parser;
use rustdmp_core::address::AddressSpec;
use rustdmp_core::map::IndexPolicy;
use rustdmp_core::values::ValueCursor;
use rustdmp_device::{Component, Controller, ControllerHandler, DmpError, PropertyRun};
use rustdmp_session::{BlockSource, MemberHandle, UdpSession};
use rustdmp_tools::{format_hex, parse_adspec, DeviceDescription};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "dmp-subscribe")]
struct Args {
    /// Device description JSON of the target.
    description: PathBuf,
    /// Addresses to watch, as base or base:increment:count.
    #[arg(value_parser = parse_adspec)]
    address: AddressSpec,
    #[arg(long)]
    ip: IpAddr,
    #[arg(long, default_value_t = MemberHandle::DMP_DEFAULT_PORT)]
    port: u16,
}

struct PrintEvents;

impl ControllerHandler for PrintEvents {
    fn event(
        &mut self,
        run: &PropertyRun<'_>,
        values: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError> {
        for address in run.adspec.addresses() {
            let value = values
                .next_value(run.prop.element_size())
                .map_err(|_| DmpError::LostSync)?;
            println!("{} {address}: {}", run.source, format_hex(value));
        }
        Ok(run.count())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let desc = DeviceDescription::load(&args.description)?;
    let map = Arc::new(desc.build_map(IndexPolicy::default())?);
    let session = UdpSession::bind("0.0.0.0:0".parse()?).await?;
    let device = MemberHandle::Ip(SocketAddr::new(args.ip, args.port));

    let controller = Controller::new(session, map.clone());
    controller.subscribe(device, args.address).await?;
    println!("subscribed; waiting for events. Ctrl+C to stop.");

    let mut component = Component::new(map).with_controller_handler(PrintEvents);
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let (n, source) = controller.session().recv_block(&mut buf).await?;
        if let Err(e) = component.receive_block(controller.session(), source, &buf[..n]) {
            log::debug!("error handling block from {source}: {e}");
        }
    }
}
