#[allow(clippy::expect_used)]
fn main() {
    tonic_build::configure()
        .compile(&["proto/agentmesh.proto"], &["proto"])
        .expect("failed to compile agentmesh proto");
}
