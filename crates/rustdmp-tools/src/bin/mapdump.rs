use clap::Parser;
use rustdmp_core::map::{IndexPolicy, MapLayout, RegionEntry};
use rustdmp_tools::{parse_adspec, DeviceDescription};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dmp-mapdump")]
struct Args {
    /// Device description JSON.
    description: PathBuf,
    /// Always build a search map.
    #[arg(long)]
    no_index: bool,
    /// Addresses to resolve, as base or base:increment:count.
    #[arg(long, value_parser = parse_adspec)]
    resolve: Vec<rustdmp_core::address::AddressSpec>,
    /// Print statistics as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let desc = DeviceDescription::load(&args.description)?;
    let policy = if args.no_index {
        IndexPolicy::never()
    } else {
        IndexPolicy::default()
    };
    let map = desc.build_map(policy)?;
    let stats = map.stats();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "{} properties, {} regions, max tests {}, ambiguous {}",
            stats.properties, stats.regions, stats.max_tests, stats.ambiguous
        );
        match map.layout() {
            MapLayout::Index { base, slots } => {
                println!("index map: base {base}, {} slots", slots.len());
            }
            MapLayout::Search(regions) => {
                for reg in regions {
                    let owners = match &reg.entry {
                        RegionEntry::Packed(r) => format!("packed {}", r.index()),
                        RegionEntry::Sparse(r) => format!("sparse {}", r.index()),
                        RegionEntry::Many(refs) => {
                            let list: Vec<String> =
                                refs.iter().map(|r| r.index().to_string()).collect();
                            format!("many [{}]", list.join(", "))
                        }
                    };
                    println!("{:>10}..={:<10} {owners}", reg.low, reg.high);
                }
            }
        }
    }

    for spec in &args.resolve {
        for address in spec.addresses() {
            match map.resolve(address) {
                Some(r) => {
                    let prop = map.property(r);
                    println!(
                        "{address}: property {} ({:?}, {:?})",
                        r.index(),
                        prop.element_size(),
                        prop.flags()
                    );
                }
                None => println!("{address}: unmapped"),
            }
        }
    }
    Ok(())
}
