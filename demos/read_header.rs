use luks2_unlock::{Luks2Area, Luks2Device, Luks2Keyslot, Luks2Kdf};
use std::env;
use std::fs::File;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <device>", args[0]);
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

    let h = device.header();
    println!("LUKS2 detected on {}", device_path);
    println!("  Label:         {}", h.label);
    println!("  UUID:          {}", h.uuid);
    println!("  Subsystem:     {}", h.subsystem);
    println!("  Checksum Alg:  {}", h.checksum_alg);
    println!("  Header Size:   {}", h.hdr_size);
    println!("  Seqid:         {}", h.seqid);
    println!("  Keyslots:      {}", device.num_keyslots());

    for (index, slot) in &device.metadata().keyslots {
        match slot {
            Luks2Keyslot::Luks2 { key_size, area, kdf, .. } => {
                let kdf = match kdf {
                    Luks2Kdf::Pbkdf2 { hash, iterations, .. } => format!("pbkdf2-{} ({} iterations)", hash, iterations),
                    Luks2Kdf::Argon2i { time, memory, .. } => format!("argon2i (time {}, memory {} KiB)", time, memory),
                    Luks2Kdf::Argon2id { time, memory, .. } => format!("argon2id (time {}, memory {} KiB)", time, memory),
                    Luks2Kdf::Unsupported(name) => format!("{} (unsupported)", name),
                };
                let encryption = match area {
                    Luks2Area::Raw { encryption, .. } => encryption.as_str(),
                    _ => "-",
                };
                println!(
                    "    {}: {} bits, {}, {}, priority {:?}",
                    index,
                    key_size * 8,
                    encryption,
                    kdf,
                    slot.priority()
                );
            }
            Luks2Keyslot::Reencrypt { mode, .. } => println!("    {}: reencrypt ({:?})", index, mode),
        }
    }

    for (index, token) in &device.metadata().tokens {
        println!("  Token {}: {} (keyslots {:?})", index, token.token_type, token.keyslots);
    }
}
