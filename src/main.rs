mod catalog;
mod cli;
mod controller;
mod decoder;
mod pick;
mod prefetch;
mod session;
mod ui;

use anyhow::{Context, bail};
use clap::Parser;
use std::fs;
use std::sync::Arc;
use winit::event_loop::EventLoop;

use crate::catalog::Catalog;
use crate::cli::{Cli, StartMode};
use crate::session::{Session, SessionStore};
use crate::ui::{App, Launch, UserEvent};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    println!("\n=== Image Shortlisting Tool ===\n");

    let store = SessionStore::new(&cli.state);
    let saved = match store.load() {
        Ok(saved) => saved,
        Err(e) => {
            log::warn!("Ignoring saved session: {}", e);
            None
        }
    };

    let (catalog, output_dir, start_index) = match (cli.start_mode(saved.as_ref())?, saved) {
        (StartMode::Resume, Some(saved)) => {
            let catalog = Catalog::scan(&saved.root, cli.follow_links)
                .with_context(|| format!("cannot resume session from {}", store.path().display()))?;
            if catalog.is_empty() {
                bail!("No images found in {}", saved.root.display());
            }
            if catalog.len() != saved.total_images {
                log::warn!(
                    "Catalog changed since last session: {} images saved, {} found",
                    saved.total_images,
                    catalog.len()
                );
            }
            (catalog, saved.output_dir, saved.current_index)
        }
        _ => {
            let (root, output_dir) = cli.new_session_paths()?;
            let catalog = Catalog::scan(&root, cli.follow_links)?;
            if catalog.is_empty() {
                bail!("No images found in {}", root.display());
            }
            fs::create_dir_all(&output_dir)
                .with_context(|| format!("cannot create {}", output_dir.display()))?;

            let session = Session::new(catalog.root().to_path_buf(), output_dir.clone(), 0, catalog.len());
            if let Err(e) = store.save(&session) {
                log::warn!("Could not save session: {}", e);
            }
            (catalog, output_dir, 0)
        }
    };

    let event_loop = EventLoop::<UserEvent>::with_user_event()
        .build()
        .context("create event loop")?;
    let proxy = event_loop.create_proxy();

    let launch = Launch {
        catalog: Arc::new(catalog),
        output_dir,
        start_index,
        store,
        window_size: (cli.width, cli.height),
    };
    let mut app = App::new(launch, proxy);

    event_loop.run_app(&mut app).context("run event loop")?;
    Ok(())
}
