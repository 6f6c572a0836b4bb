fn main() {
    prost_build::Config::new()
        .compile_protos(&["proto/envelope.proto"], &["proto"])
        .expect("failed to compile envelope.proto");
}
