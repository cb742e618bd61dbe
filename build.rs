use std::error::Error;
use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn Error>> {
    EmitBuilder::builder()
        .fail_on_error()
        .all_git()
        .git_describe(true, false, Some("NoSuchTagPattern"))
        .emit()?;

    // vergen watches the git state; the manifest and sources also mark a build dirty
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=src");

    Ok(())
}
