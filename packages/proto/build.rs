fn main() -> Result<(), Box<dyn std::error::Error>> {
    let fds = protox::compile(["proto/auctioneer.proto", "proto/swapserver.proto"], ["proto/"])?;

    // Default stubs answer `Unimplemented`, so mocks only override what a test needs.
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .generate_default_stubs(true)
        .compile_fds(fds)?;

    Ok(())
}
