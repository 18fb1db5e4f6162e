fn main() -> Result<(), Box<dyn std::error::Error>> {
    // use the bundled protoc unless the environment already provides one
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    tonic_build::compile_protos("src/mapreduce/proto/mr.proto")?;
    Ok(())
}
