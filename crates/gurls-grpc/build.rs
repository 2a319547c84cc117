fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use the bundled protoc unless the environment provides one.
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    if std::env::var_os("PROTOC_INCLUDE").is_none() {
        std::env::set_var("PROTOC_INCLUDE", protoc_bin_vendored::include_path()?);
    }

    tonic_build::configure()
        .build_server(false)
        .compile(&["proto/shortener/v1/shortener.proto"], &["proto"])?;
    Ok(())
}
