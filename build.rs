//! Cross-compiles `ctxtrace-ebpf` to eBPF bytecode and makes the resulting
//! object available to `src/main.rs` via `OUT_DIR`.
//!
//! This is the minimal glue `aya-build` requires to embed the probe in the
//! host binary; it intentionally does not grow into a general build system.

use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let ebpf_dir = manifest_dir.join("ctxtrace-ebpf");
    let cargo_metadata::Metadata { packages, .. } = cargo_metadata::MetadataCommand::new()
        .manifest_path(ebpf_dir.join("Cargo.toml"))
        .exec()?;
    let ebpf_package = packages
        .into_iter()
        .find(|p| p.name == "ctxtrace-ebpf")
        .expect("ctxtrace-ebpf package not found in its own metadata");

    aya_build::build_ebpf([ebpf_package])
}
