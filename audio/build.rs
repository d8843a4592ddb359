fn main() {
    if std::env::var_os("CARGO_FEATURE_LIBOPUS").is_some() {
        println!("cargo:rustc-link-lib=opus");
    }
}
