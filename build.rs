fn main() {
    // Stamp the binary for `--version` output
    let build_date = chrono::Utc::now()
        .format("%Y-%m-%d %H:%M UTC")
        .to_string();
    println!("cargo:rustc-env=BUILD_DATE={}", build_date);

    // TARGET is set by cargo for build scripts
    let target = std::env::var("TARGET").unwrap_or_default();
    println!("cargo:rustc-env=BUILD_TARGET={}", target);
}
