fn main() {
    println!("cargo:rerun-if-changed=proto/metrics.proto");
    println!("cargo:rerun-if-changed=proto/remote.proto");

    let mut prost_build = prost_build::Config::new();
    prost_build.btree_map(["."]);
    prost_build.type_attribute("LabelPair", "#[derive(Eq, Hash, Ord, PartialOrd)]");
    prost_build.type_attribute("Label", "#[derive(Eq, Hash, Ord, PartialOrd)]");
    prost_build
        .compile_protos(&["proto/metrics.proto", "proto/remote.proto"], &["proto"])
        .unwrap();
}
