use std::path::PathBuf;

const DEFAULT_WET_RAW: u16 = 300;
const DEFAULT_DRY_RAW: u16 = 1023;
const DEFAULT_SETTLE_MS: u64 = 25;
const DEFAULT_INTERVAL_MS: u64 = 1000;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    println!("cargo:rerun-if-env-changed={name}");
    match std::env::var(name) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| panic!("{name} is not a valid number: '{value}'")),
        Err(_) => default,
    }
}

fn main() {
    let wet_raw = env_or("MOISTURE_WET_RAW", DEFAULT_WET_RAW);
    let dry_raw = env_or("MOISTURE_DRY_RAW", DEFAULT_DRY_RAW);
    let settle_ms = env_or("MOISTURE_SETTLE_MS", DEFAULT_SETTLE_MS);
    let interval_ms = env_or("MOISTURE_INTERVAL_MS", DEFAULT_INTERVAL_MS);

    if dry_raw <= wet_raw {
        panic!("MOISTURE_DRY_RAW ({dry_raw}) must be greater than MOISTURE_WET_RAW ({wet_raw})");
    }

    let out_dir_path = PathBuf::from(std::env::var_os("OUT_DIR").unwrap());
    let out_file_path = out_dir_path.join("consts.rs");

    std::fs::write(
        out_file_path,
        format!(
            "
            // generated form env vars
            pub const WET_RAW: u16 = {wet_raw};
            pub const DRY_RAW: u16 = {dry_raw};
            pub const SETTLE_TIME_MS: u64 = {settle_ms};
            pub const REPORT_INTERVAL_MS: u64 = {interval_ms};"
        ),
    )
    .unwrap();
}
