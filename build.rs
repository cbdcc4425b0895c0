fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile the shard's gRPC contract; the client stubs serve the probe client and tests.
    println!("cargo:rerun-if-changed=proto/cf_service.proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(&["proto/cf_service.proto"], &["proto"])?;

    Ok(())
}
