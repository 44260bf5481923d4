use std::{env, error::Error};

fn main() -> Result<(), Box<dyn Error>> {
    let proto_dir = "proto";
    println!("cargo:rerun-if-changed={}", proto_dir);

    // Fall back to the vendored protoc when none is configured
    if env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()?;
        // SAFETY: build scripts are single threaded
        unsafe { env::set_var("PROTOC", protoc) };
    }

    tonic_build::configure()
        .type_attribute("echo_service.StringMessage", "#[derive(serde::Serialize, serde::Deserialize)]")
        .type_attribute("echo_service.StringMessage", "#[serde(default)]")
        .compile(&[format!("{}/echo_service.proto", proto_dir)], &[proto_dir])?;

    Ok(())
}
