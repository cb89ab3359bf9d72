use luks2_unlock::{Luks2Device, UnlockOutcome};
use std::env;
use std::fs::File;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <device> [keyslot]", args[0]);
        process::exit(1);
    }

    let device_path = &args[1];
    let mut file = File::open(device_path).unwrap_or_else(|e| {
        eprintln!("Error opening {}: {}", device_path, e);
        process::exit(1);
    });

    let device = Luks2Device::open(&mut file).unwrap_or_else(|e| {
        eprintln!("Error reading LUKS2 header: {}", e);
        process::exit(1);
    });

    let passphrase = zeroize::Zeroizing::new(rpassword::prompt_password("Enter passphrase: ").unwrap_or_else(|e| {
        eprintln!("Error reading passphrase: {}", e);
        process::exit(1);
    }));

    let outcome = match args.get(2) {
        Some(keyslot) => {
            let index: u32 = keyslot.parse().unwrap_or_else(|_| {
                eprintln!("Invalid keyslot: {}", keyslot);
                process::exit(1);
            });
            device.unlock_keyslot(&mut file, index, passphrase.as_bytes())
        }
        None => device.unlock_any(&mut file, passphrase.as_bytes()),
    };

    match outcome {
        Ok(UnlockOutcome::Unlocked(volume)) => {
            println!("Unlocked {} with keyslot {}", device.uuid(), volume.keyslot);
            println!("  Key size:      {} bits", volume.key().len() * 8);
            println!("  Encryption:    {}", volume.storage_encryption);
            println!("  Sector size:   {}", volume.storage_sector_size);
            println!("  Offset:        {} sectors", volume.storage_offset);
            if volume.storage_size == 0 {
                println!("  Size:          to end of device");
            } else {
                println!("  Size:          {} sectors", volume.storage_size);
            }
            println!("  IV tweak:      {}", volume.storage_iv_tweak);
        }
        Ok(UnlockOutcome::WrongPassphrase) => {
            println!("No keyslot matches this passphrase.");
            process::exit(2);
        }
        Err(e) => {
            eprintln!("Error unlocking {}: {}", device_path, e);
            process::exit(1);
        }
    }
}
