//! winstate :: watch the frontmost application
//!
//! Prints a line every time the frontmost application or its main window
//! changes. Run with `--example watch-frontmost` on macOS with accessibility
//! permissions granted to the terminal running it.
use tracing_subscriber::{self, prelude::*};

use winstate::accessibility::backend::MacosAccessibility;
use winstate::Event;

#[tokio::main(flavor = "current_thread")]
async fn main() -> winstate::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").finish().init();

    let state = winstate::initialize(MacosAccessibility::new()).await?;

    state.on(|event| match event {
        Event::FrontmostApplicationChanged { new, .. } => match new {
            Some(app) => println!(
                "frontmost -> {} ({:?})",
                app.localized_name().unwrap_or("<unknown>"),
                app.bundle_id()
            ),
            None => println!("frontmost -> <none>"),
        },
        Event::ApplicationMainWindowChanged { application, new, .. } => {
            println!(
                "{}: main window -> {:?}",
                application.localized_name().unwrap_or("<unknown>"),
                new.as_ref().and_then(|w| w.title())
            );
        }
        Event::ApplicationLaunched(app) => {
            println!("launched: {}", app.localized_name().unwrap_or("<unknown>"));
        }
        Event::ApplicationTerminated(app) => {
            println!("terminated: pid {}", app.pid());
        }
        _ => {}
    });

    if let Some(app) = state.frontmost_application() {
        println!("currently frontmost: {}", app.localized_name().unwrap_or("<unknown>"));
    }

    // Keep the process (and its main-thread run loop) alive to receive
    // notifications; a real embedder would integrate this with their own
    // event loop instead of parking here.
    std::future::pending::<()>().await;
    Ok(())
}
