use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=memory");
    println!("cargo:rerun-if-env-changed=FREERTOS_LIB_DIR");

    // Host builds only run the unit tests; nothing to link.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("none") {
        return;
    }

    // Copy the selected board's memory layout into OUT_DIR as memory.x so
    // cortex-m-rt's link.x can INCLUDE it
    let layout = if env::var_os("CARGO_FEATURE_STM32F103C8").is_some() {
        "memory/stm32f103c8.x"
    } else {
        "memory/lpc4078.x"
    };
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::copy(layout, out_dir.join("memory.x")).unwrap();
    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=--nmagic");

    // FreeRTOS kernel + port, prebuilt with FreeRTOSConfig.h for this board
    match env::var("FREERTOS_LIB_DIR") {
        Ok(dir) => {
            println!("cargo:rustc-link-search=native={dir}");
            println!("cargo:rustc-link-lib=static=freertos");
        }
        Err(_) => println!(
            "cargo:warning=FREERTOS_LIB_DIR not set; firmware will not link without libfreertos.a"
        ),
    }
}
