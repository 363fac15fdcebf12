use anyhow::Result;
use fs_extra::copy_items;
use fs_extra::dir::CopyOptions;
use std::env;

fn main() -> Result<()> {
    // Rebuild whenever a shader, model or config under res/ changes
    for entry in glob::glob("res/**/*")? {
        println!("cargo:rerun-if-changed={}", entry?.display());
    }

    let out_dir = env::var("OUT_DIR")?;
    let mut copy_options = CopyOptions::new();
    copy_options.overwrite = true;
    copy_items(&["res/"], out_dir, &copy_options)?;

    Ok(())
}
