fn main() {
    // Emits `built.rs` into OUT_DIR with package metadata and the git commit hash.
    built::write_built_file().expect("Failed to acquire build-time information");
}
