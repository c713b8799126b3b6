use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use crossfire_client::faces::decoder::{encode_png, load_face_images};
use crossfire_client::faces::{FaceDecoder, FileCache, ImageCache, PngFaceDecoder};
use crossfire_client::filepaths;
use crossfire_client::settings::FaceSettings;
use log::LevelFilter;

fn usage() -> &'static str {
    "Usage:\n  cargo run --package crossfire-client-utils --bin face_cache_tool -- [options] <command>\n\nCommands:\n  path <name> <checksum>             Print the cache file of an entry\n  lookup <name> <checksum>           Show whether an entry is cached and decodes\n  import <name> <checksum> <image>   Store an image file in the cache\n  decode <image> <out-dir>           Write the original, 2x and magic map variants as PNG\n\nOptions:\n  --settings <path>    Face settings file (defaults to faces.json next to the executable)\n  --cache-dir <path>   Override the cache directory from the settings\n  --verbose            Log debug output\n  --help               Print this help"
}

struct Args {
    settings: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    verbose: bool,
    command: Vec<String>,
}

fn parse_args() -> Result<Args> {
    let mut parsed = Args {
        settings: None,
        cache_dir: None,
        verbose: false,
        command: Vec::new(),
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            "--verbose" | "-v" => parsed.verbose = true,
            "--settings" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("--settings requires a path\n\n{}", usage()))?;
                parsed.settings = Some(PathBuf::from(value));
            }
            "--cache-dir" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("--cache-dir requires a path\n\n{}", usage()))?;
                parsed.cache_dir = Some(PathBuf::from(value));
            }
            _ if arg.starts_with("--") => bail!("unknown option {arg}\n\n{}", usage()),
            _ => parsed.command.push(arg),
        }
    }

    if parsed.command.is_empty() {
        bail!("missing command\n\n{}", usage());
    }
    Ok(parsed)
}

fn parse_checksum(value: &str) -> Result<u32> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };
    parsed.with_context(|| format!("invalid checksum {value:?}"))
}

fn expect_args<'a>(command: &'a [String], count: usize) -> Result<&'a [String]> {
    let args = &command[1..];
    if args.len() != count {
        bail!(
            "{} expects {count} argument(s), got {}\n\n{}",
            command[0],
            args.len(),
            usage()
        );
    }
    Ok(args)
}

fn lookup(cache: &FileCache, name: &str, checksum: u32) -> Result<()> {
    let path = cache.path_for(name, checksum);
    let Some(data) = cache.load(name, checksum) else {
        println!("miss: {}", path.display());
        return Ok(());
    };

    println!("hit: {} ({} bytes)", path.display(), data.len());
    match PngFaceDecoder.decode(&data) {
        Ok(images) => println!(
            "decodes to {}x{}",
            images.original().width(),
            images.original().height()
        ),
        Err(e) => println!("does not decode: {e}"),
    }
    Ok(())
}

fn import(cache: &FileCache, name: &str, checksum: u32, image: &Path) -> Result<()> {
    let data = fs::read(image).with_context(|| format!("failed to read {}", image.display()))?;
    PngFaceDecoder
        .decode(&data)
        .with_context(|| format!("{} is not a usable face image", image.display()))?;

    cache.save(name, checksum, &data);
    if cache.load(name, checksum).as_deref() != Some(data.as_slice()) {
        bail!(
            "failed to store {} (see log; files over the size limit are not served)",
            cache.path_for(name, checksum).display()
        );
    }
    println!("stored {}", cache.path_for(name, checksum).display());
    Ok(())
}

fn decode(image: &Path, out_dir: &Path) -> Result<()> {
    let images = load_face_images(image, &PngFaceDecoder)
        .with_context(|| format!("failed to decode {}", image.display()))?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let stem = image
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("face");
    let variants = [
        ("", images.original()),
        (".x2", images.scaled()),
        (".mm", images.magic_map()),
    ];
    for (suffix, variant) in variants {
        let path = out_dir.join(format!("{stem}{suffix}.png"));
        let png = encode_png(variant)?;
        fs::write(&path, png).with_context(|| format!("failed to write {}", path.display()))?;
        println!(
            "wrote {} ({}x{})",
            path.display(),
            variant.width(),
            variant.height()
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    cf_core::initialize_logger(level, None)?;

    let settings_path = args.settings.unwrap_or_else(filepaths::get_settings_file);
    let mut settings = FaceSettings::load(&settings_path);
    if let Some(cache_dir) = args.cache_dir {
        settings.cache_dir = cache_dir;
    }
    let cache = FileCache::new(&settings.cache_dir, settings.max_cached_file_size);

    let command = &args.command;
    match command[0].as_str() {
        "path" => {
            let a = expect_args(command, 2)?;
            println!("{}", cache.path_for(&a[0], parse_checksum(&a[1])?).display());
        }
        "lookup" => {
            let a = expect_args(command, 2)?;
            lookup(&cache, &a[0], parse_checksum(&a[1])?)?;
        }
        "import" => {
            let a = expect_args(command, 3)?;
            import(&cache, &a[0], parse_checksum(&a[1])?, Path::new(&a[2]))?;
        }
        "decode" => {
            let a = expect_args(command, 2)?;
            decode(Path::new(&a[0]), Path::new(&a[1]))?;
        }
        other => bail!("unknown command {other}\n\n{}", usage()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksums_accept_decimal_and_hex() {
        assert_eq!(parse_checksum("1234").unwrap(), 1234);
        assert_eq!(parse_checksum("0xff").unwrap(), 255);
        assert!(parse_checksum("nope").is_err());
    }

    #[test]
    fn argument_count_is_checked() {
        let command = vec!["path".to_string(), "wall.111".to_string()];
        assert!(expect_args(&command, 2).is_err());
        assert_eq!(expect_args(&command, 1).unwrap(), ["wall.111".to_string()]);
    }
}
