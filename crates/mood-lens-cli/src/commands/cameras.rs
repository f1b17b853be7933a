//! Cameras command - list capture devices.

use anyhow::Result;

/// Run the cameras command.
#[cfg(feature = "camera-nokhwa")]
pub fn run() -> Result<()> {
    let cameras = mood_lens_adapters::list_cameras()?;
    if cameras.is_empty() {
        println!("No cameras found");
    }
    for (index, name) in cameras {
        println!("  {index}: {name}");
    }
    Ok(())
}

/// Run the cameras command.
#[cfg(not(feature = "camera-nokhwa"))]
pub fn run() -> Result<()> {
    anyhow::bail!("this build has no capture backend (rebuild with --features camera-nokhwa)")
}
