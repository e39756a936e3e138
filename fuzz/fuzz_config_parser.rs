//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary input through `AppConfig::parse()` and, for configs that
//! validate, through server resolution, looking for panics or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = veilproxy_config::AppConfig::parse(s) {
        // A validated config always resolves.
        let servers = config
            .resolved_servers()
            .expect("validated config must resolve");
        assert_eq!(servers.len(), config.servers.len());
    }
});
