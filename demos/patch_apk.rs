use std::env;
use std::error::Error;
use std::process::exit;

use dexpatch::{patch_apk, BASELINE_PROFILE_ENTRY};

// Rewrites the R8 map id inside an APK so a local rebuild can be compared
// byte-for-byte against an official release. Grab the target id from the
// official APK's classes.dex (the pg-map-id field).

//Usage: patch_apk <input-apk> <output-apk> <map-id-hex>
fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        eprintln!("Usage: patch_apk <input-apk> <output-apk> <map-id-hex>");
        exit(2);
    }

    match process(&args[1], &args[2], &args[3]) {
        Ok(_) => {
            println!("All done: written {}", &args[2]);
        }
        Err(e) => {
            println!("Aborted due to error: {e}");
            exit(1);
        }
    }
}

fn process(input: &str, output: &str, map_id: &str) -> Result<(), Box<dyn Error>> {
    let summary = patch_apk(input, output, map_id)?;

    for dex in &summary.dex_entries {
        match &dex.pg_map_id {
            Some(rewrite) => println!(
                "{}: pg-map-id {} -> {} (container checksum 0x{:x})",
                dex.name, rewrite.old, rewrite.new, dex.container_checksum
            ),
            None => println!("{}: no map-id marker found", dex.name),
        }
        if dex.source_strings_rewritten > 0 || dex.source_strings_skipped > 0 {
            println!(
                "{}: {} source string(s) rewritten, {} skipped",
                dex.name, dex.source_strings_rewritten, dex.source_strings_skipped
            );
        }
    }
    if summary.profile_patched {
        println!("{BASELINE_PROFILE_ENTRY}: checksums updated");
    }
    Ok(())
}
