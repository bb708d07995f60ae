//! WaveEdit entry point
//!
//! Two modes share this executable:
//! - plugin-scanner worker, selected by `--waveedit-plugin-scanner` on the
//!   command line (every other argument is ignored in that mode); spawned
//!   by the scan coordinator so plug-in probing is crash-isolated
//! - the editor itself, which boots the settings store and hands control to
//!   the UI shell

use we_plugin::SCANNER_WORKER_FLAG;
use we_state::Settings;

fn main() {
    env_logger::init();

    // Worker mode wins over everything else; the coordinator controls this
    // process entirely through stdio.
    if std::env::args().any(|arg| arg == SCANNER_WORKER_FLAG) {
        std::process::exit(we_plugin::worker::run_worker());
    }

    let settings_path = Settings::default_path();
    let settings = Settings::load_from(&settings_path);
    let sample_rate = settings.get_f64("audio.sample_rate", 48000.0);
    log::info!(
        "settings loaded from {} (default rate {sample_rate} Hz)",
        settings_path.display()
    );

    // The desktop shell owns windows, menus and dialogs; without it this
    // binary only offers worker mode.
    eprintln!("waveedit: no UI shell in this build; run with {SCANNER_WORKER_FLAG} for scanner worker mode");
}
