use pb_rs::{ConfigBuilder, types::FileDescriptor};
use std::{env, fs};

const PROTOS: [&str; 2] = ["osmdata.proto", "osmformat.proto"];

fn main() {
    let out_dir = format!("{}/proto", env::var("OUT_DIR").unwrap());
    let in_dir = format!("{}/proto", env::var("CARGO_MANIFEST_DIR").unwrap());

    let protos: Vec<String> = PROTOS
        .iter()
        .map(|name| format!("{}/{}", in_dir, name))
        .collect();
    for proto in &protos {
        println!("cargo:rerun-if-changed={}", proto);
    }

    // start from an empty output directory so renamed messages do not linger
    if fs::metadata(&out_dir).is_ok() {
        fs::remove_dir_all(&out_dir).unwrap();
    }
    fs::create_dir_all(&out_dir).unwrap();

    let config = ConfigBuilder::new(&protos, None, Some(&out_dir), &[in_dir])
        .expect("could not generate pb-rs config");
    FileDescriptor::run(&config.build()).expect("could not generate proto files");
}
