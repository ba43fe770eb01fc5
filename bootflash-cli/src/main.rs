use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::Context;
use colored::Colorize;

use crate::{
    cli::CommandLineArgs,
    firmware_image::FirmwareImage,
    flash_and_reset::flash_and_reset,
    probe_rs::{attach, connect_to_probe, flashing::ProbeRsTarget, print_probe_list},
};

mod boot_memory;
mod cli;
mod error;
mod firmware_image;
mod flash_and_reset;
mod logging;
mod probe_rs;

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = CommandLineArgs::parse();
    logging::init_logging(args.verbose, args.quiet);

    if args.list_probes {
        print_probe_list();
        return Ok(());
    }

    // Load the image before touching the probe
    let image_path = args.image.as_deref().context("No firmware image given")?;
    let image = FirmwareImage::load(image_path, args.format)
        .with_context(|| format!("Failed to load firmware image {:?}", image_path))?;
    if let Some(elf) = &image.elf {
        tracing::debug!("ELF entry point {:#010X}, {} segment(s)", elf.entry, elf.segments.len());
    }

    // Connect and attach, the session is released when `target` is dropped
    let connect_options = args.connect_options()?;
    let probe = connect_to_probe(connect_options.probe.as_ref())
        .context("Failed to open debug probe")?;
    let session = attach(probe, &connect_options).context("Failed to attach to target")?;
    let mut target = ProbeRsTarget::new(session, !args.quiet);

    // Until here CTRL-C terminates right away. From now on flash writes in progress are
    // never interrupted, the sequence stops after the current step instead.
    let abort_flag = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler(stop_after_current_step(abort_flag.clone()))?;

    let report = flash_and_reset(&mut target, &image, &args.flash_plan(), &abort_flag)
        .context("Flashing failed")?;
    println!("{} {}", "✅".green(), report);

    Ok(())
}

fn stop_after_current_step(abort_flag: Arc<AtomicBool>) -> impl FnMut() + Send + 'static {
    move || {
        eprintln!("CTRL-C received, stopping after the current step...");
        abort_flag.store(true, Ordering::SeqCst);
    }
}
