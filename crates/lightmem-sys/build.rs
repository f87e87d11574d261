fn main() {
    // Only build the external kernel library when the `kernels` feature is enabled.
    #[cfg(feature = "kernels")]
    {
        use std::env;

        let src = env::var("LIGHTMEM_KERNELS_SRC").unwrap_or_else(|_| "../../kernels".to_string());

        let dst = cmake::Config::new(&src)
            .define("CMAKE_BUILD_TYPE", "Release")
            .build();

        println!(
            "cargo:rustc-link-search=native={}",
            dst.join("lib").display()
        );
        println!("cargo:rustc-link-lib=static=lightmem_kernels");

        #[cfg(target_os = "linux")]
        println!("cargo:rustc-link-lib=stdc++");
        #[cfg(target_os = "macos")]
        println!("cargo:rustc-link-lib=c++");

        println!("cargo:rerun-if-env-changed=LIGHTMEM_KERNELS_SRC");
    }
}
