//! Application entry point for the Cellular Boids viewer.
//!
//! This binary sets up logging and eframe/egui and delegates all
//! interactive logic and rendering to [`Viewer`] from the `viewer` module.

mod viewer;

use viewer::Viewer;

/// Starts the native eframe application.
///
/// Logging goes through `env_logger`, so `RUST_LOG=sim_core=debug` shows
/// reset and grid diagnostics from the simulation core.
///
/// ### Returns
/// - `Ok(())` if the application runs to completion without errors.
/// - `Err` if eframe fails to create the native window or event loop, or
///   the initial simulation cannot be built.
fn main() -> eframe::Result<()> {
    env_logger::init();

    let options = eframe::NativeOptions::default();

    eframe::run_native(
        "Cellular Boids",
        options,
        Box::new(|_cc| {
            // Construct the root app state for the viewer.
            Ok(Box::new(Viewer::new()?))
        }),
    )
}
