fn main() {
    // Link directives are only needed when building against the vendor library.
    // Without the `phlib` feature the crate builds with the simulated library only.
    #[cfg(feature = "phlib")]
    {
        println!("cargo:rerun-if-env-changed=PHLIB_DIR");

        if let Ok(lib_dir) = std::env::var("PHLIB_DIR") {
            println!("cargo:rustc-link-search=native={}", lib_dir);
        }

        match std::env::var("CARGO_CFG_TARGET_OS").as_deref() {
            Ok("windows") => println!("cargo:rustc-link-lib=phlib64"),
            _ => println!("cargo:rustc-link-lib=ph300"),
        }
    }
}
