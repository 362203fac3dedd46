use serde::Deserialize;
use std::{env, fmt::Write, fs, path::PathBuf};

#[derive(Deserialize)]
struct Table {
    driver: DriverFlags,
    devices: Vec<Device>,
    of_match: Vec<OfMatch>,
    tuning: Vec<Tuning>,
}

#[derive(Deserialize)]
struct DriverFlags {
    max_devices: usize,
    class_name: String,
    node_prefix: String,
    attr_group: String,
}

#[derive(Deserialize)]
struct Device {
    name: String,
    size: u32,
    permission: u32,
    serial_number: String,
    tuning: u32,
}

#[derive(Deserialize)]
struct OfMatch {
    compatible: String,
    tuning: u32,
}

#[derive(Deserialize)]
struct Tuning {
    tag: u32,
    configure_num1: i32,
    configure_num2: i32,
}

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
    let table_path = PathBuf::from(&manifest_dir).join("../../pcdevs.json");
    let table_str = fs::read_to_string(&table_path)
        .unwrap_or_else(|err| panic!("Error reading {}: {}", table_path.display(), err));
    let table: Table = serde_json::from_str(&table_str)
        .unwrap_or_else(|err| panic!("Error parsing {}: {}", table_path.display(), err));
    if table.driver.max_devices == 0 {
        panic!("driver.max_devices must be positive.");
    }

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    fs::write(PathBuf::from(out_dir).join("build_table.rs"), make_table(&table))
        .expect("Error writing build_table.rs");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../../pcdevs.json");
}

fn make_table(table: &Table) -> String {
    let mut s = String::new();
    let flags = &table.driver;
    // `{:?}` on a str gives a valid, escaped Rust literal
    writeln!(s, "pub const NO_OF_DEVICES: usize = {};", flags.max_devices).unwrap();
    writeln!(s, "pub const CLASS_NAME: &str = {:?};", flags.class_name).unwrap();
    writeln!(s, "pub const NODE_PREFIX: &str = {:?};", flags.node_prefix).unwrap();
    writeln!(s, "pub const ATTR_GROUP_NAME: &str = {:?};", flags.attr_group).unwrap();

    s += "pub static PLATFORM_DEVICES: &[PlatformDeviceEntry] = &[\n";
    for dev in &table.devices {
        writeln!(
            s,
            concat!(
                "    PlatformDeviceEntry {{ name: {:?}, size: {}, permission: {}, ",
                "serial_number: {:?}, tuning: {} }},"
            ),
            dev.name, dev.size, dev.permission, dev.serial_number, dev.tuning
        )
        .unwrap();
    }
    s += "];\n";

    s += "pub static OF_MATCH_TABLE: &[OfMatchEntry] = &[\n";
    for entry in &table.of_match {
        writeln!(
            s,
            "    OfMatchEntry {{ compatible: {:?}, tuning: {} }},",
            entry.compatible, entry.tuning
        )
        .unwrap();
    }
    s += "];\n";

    s += "pub static TUNING_TABLE: &[TuningParams] = &[\n";
    for entry in &table.tuning {
        writeln!(
            s,
            "    TuningParams {{ tag: {}, configure_num1: {}, configure_num2: {} }},",
            entry.tag, entry.configure_num1, entry.configure_num2
        )
        .unwrap();
    }
    s += "];\n";
    s
}
