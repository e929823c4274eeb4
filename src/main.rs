/*
 * shardcrypt: threshold-protected encrypted backup containers
 * Copyright (C) 2020-2022 The shardcrypt Authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */


mod inspect;

use std::{
    error::Error as StdError,
    fs,
    fs::File,
    io,
    io::{prelude::*, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, ensure, Context, Error};
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

extern crate shardcrypt_core;
use shardcrypt_core::{
    bundle,
    filecrypt::{
        self, Algorithm, Block, BlockSize, Encoder, EncryptionHeader, HashType, KeyAlgorithm,
        KeyHeader, Position,
    },
    shamir::{Config, FieldType, Share},
};

const PBKDF2_HASH: HashType = HashType::Sha256;
const PBKDF2_ITERATIONS: u32 = 60_000;
const PBKDF2_SALT_LENGTH: u8 = 12;
const PBKDF2_KEY_LENGTH: u8 = 32;

/// What `seal` stores in each block, one per input file.
#[derive(Debug, Serialize, Deserialize)]
struct Document {
    name: String,
    contents: Vec<u8>,
}

// shardcrypt split -t <THRESHOLD> -n <SHARES> [--field fr|fq] [--custodians C] OUTDIR
fn split_cli() -> Command {
    Command::new("split")
            .about(r#"Generate a new master key and split it into share bundles, one per custodian. The master key itself is never written to disk."#)
            .arg(Arg::new("threshold")
                .short('t')
                .long("threshold")
                .value_name("THRESHOLD")
                .help("Number of shares required to recover the master key (must not be larger than --shares).")
                .action(ArgAction::Set)
                .required(true))
            .arg(Arg::new("shares")
                .short('n')
                .long("shares")
                .value_name("NUM SHARES")
                .help("Number of shares to create (must not be smaller than --threshold).")
                .action(ArgAction::Set)
                .required(true))
            .arg(Arg::new("field")
                .long("field")
                .value_name("FIELD")
                .help("Prime field to share the master key over.")
                .value_parser(["fr", "fq"])
                .default_value("fr")
                .action(ArgAction::Set))
            .arg(Arg::new("custodians")
                .short('c')
                .long("custodians")
                .value_name("CUSTODIANS")
                .help("Number of bundles to distribute the shares between, round-robin (defaults to one bundle per share).")
                .action(ArgAction::Set))
            .arg(Arg::new("OUTDIR")
                .help("Directory to write the share bundles to.")
                .action(ArgAction::Set)
                .required(true)
                .index(1))
}

/// Deal `shares` out to `custodians` piles, round-robin.
fn distribute<T: Clone>(shares: &[T], custodians: usize) -> Vec<Vec<T>> {
    let mut piles = vec![Vec::new(); custodians];
    for (i, share) in shares.iter().enumerate() {
        piles[i % custodians].push(share.clone());
    }
    piles
}

fn split(matches: &ArgMatches) -> Result<(), Error> {
    let threshold: u32 = matches
        .get_one::<String>("threshold")
        .context("required --threshold argument not provided")?
        .parse()
        .context("--threshold argument was not an unsigned integer")?;
    let num_shares: u32 = matches
        .get_one::<String>("shares")
        .context("required --shares argument not provided")?
        .parse()
        .context("--shares argument was not an unsigned integer")?;
    let field_type = match matches.get_one::<String>("field").map(String::as_str) {
        Some("fq") => FieldType::Bn254Fq,
        _ => FieldType::Bn254Fr,
    };
    let custodians: usize = match matches.get_one::<String>("custodians") {
        Some(c) => c
            .parse()
            .context("--custodians argument was not an unsigned integer")?,
        None => num_shares as usize,
    };
    ensure!(
        custodians >= 1 && custodians <= num_shares as usize,
        "--custodians must be between 1 and --shares"
    );
    let outdir = PathBuf::from(
        matches
            .get_one::<String>("OUTDIR")
            .context("required OUTDIR argument not provided")?,
    );

    let config = Config::new(threshold, num_shares, field_type)?;
    let secret = config.new_secret();
    let shares = config.generate_shares(&secret)?;
    tracing::debug!(?config, custodians, "generated master key shares");

    fs::create_dir_all(&outdir)
        .with_context(|| format!("failed to create output directory {:?}", outdir))?;

    for (i, pile) in distribute(&shares, custodians).iter().enumerate() {
        let path = outdir.join(format!("custodian-{}.bundle", i + 1));
        let bytes = bundle::encode(&config, pile)?;
        fs::write(&path, &bytes)
            .with_context(|| format!("failed to write share bundle {:?}", path))?;

        println!(
            "{}: shares [{}] checksum {}",
            path.display(),
            pile.iter().map(Share::id).collect::<Vec<_>>().join(" "),
            bundle::checksum_string(&bytes)
        );
    }
    println!(
        "{} of {} shares are needed to recover the master key.",
        threshold, num_shares
    );

    Ok(())
}

fn key_source_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("password")
                .long("password")
                .value_name("PASSWORD")
                .help("Derive the container key from a password (with PBKDF2).")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("shares")
                .long("shares")
                .value_name("BUNDLE")
                .help("Recover the master key from a share bundle and use it as the container key (repeat once per bundle).")
                .num_args(1)
                .action(ArgAction::Append),
        )
        .group(
            ArgGroup::new("key")
                .arg("password")
                .arg("shares")
                .required(true),
        )
}

/// Recover the master key from a set of share bundles. Shares present in
/// more than one bundle are only counted once.
fn recover_master_key<P: AsRef<Path>>(paths: &[P]) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut config: Option<Config> = None;
    let mut shares: Vec<Share> = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let (bundle_config, bundle_shares) = bundle::read_file(path)
            .with_context(|| format!("failed to read share bundle {:?}", path))?;
        match &config {
            None => config = Some(bundle_config),
            Some(c) => {
                ensure!(
                    *c == bundle_config,
                    "share bundle {:?} belongs to a different secret ({:?} != {:?})",
                    path,
                    bundle_config,
                    c
                );
            }
        }
        for share in bundle_shares {
            match shares.iter().find(|s| s.index() == share.index()) {
                Some(existing) => {
                    ensure!(
                        *existing == share,
                        "share bundle {:?} has a conflicting copy of share {}",
                        path,
                        share.id()
                    );
                }
                None => shares.push(share),
            }
        }
    }

    let config = config.context("no share bundles provided")?;
    ensure!(
        shares.len() >= config.threshold() as usize,
        "{} shares are required to recover the master key but only {} were provided",
        config.threshold(),
        shares.len()
    );
    let secret = config
        .generate_secret(&shares)
        .context("recovering master key")?;
    tracing::debug!(
        shares = shares.len(),
        threshold = config.threshold(),
        "recovered master key from share bundles"
    );
    Ok(Zeroizing::new(secret.to_bytes().to_vec()))
}

enum KeySource {
    Password(Zeroizing<Vec<u8>>),
    MasterKey(Zeroizing<Vec<u8>>),
}

impl KeySource {
    fn from_matches(matches: &ArgMatches) -> Result<Self, Error> {
        if let Some(password) = matches.get_one::<String>("password") {
            return Ok(Self::Password(Zeroizing::new(password.as_bytes().to_vec())));
        }
        let paths = matches
            .get_many::<String>("shares")
            .context("neither --password nor --shares provided")?
            .collect::<Vec<_>>();
        Ok(Self::MasterKey(recover_master_key(&paths)?))
    }

    fn key_input(&self) -> &[u8] {
        match self {
            Self::Password(key) | Self::MasterKey(key) => key.as_slice(),
        }
    }

    fn key_algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::Password(_) => KeyAlgorithm::Pbkdf2,
            Self::MasterKey(_) => KeyAlgorithm::Direct,
        }
    }
}

// shardcrypt seal (--password PW | --shares BUNDLE [--shares BUNDLE]...) [--cipher aes-gcm|clear] -o OUT INPUT...
fn seal_cli() -> Command {
    key_source_args(
        Command::new("seal")
            .about(r#"Seal files into a container, one block per file."#)
            .arg(
                Arg::new("cipher")
                    .long("cipher")
                    .value_name("CIPHER")
                    .help("Cipher used for every block.")
                    .value_parser(["aes-gcm", "clear"])
                    .default_value("aes-gcm")
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("output")
                    .short('o')
                    .long("output")
                    .value_name("CONTAINER")
                    .help("Path to write the container to.")
                    .action(ArgAction::Set)
                    .required(true),
            )
            .arg(
                Arg::new("INPUT")
                    .help(r#"Files to seal into the container ("-" to read from stdin)."#)
                    .action(ArgAction::Append)
                    .allow_hyphen_values(true)
                    .required(true),
            ),
    )
}

fn read_input(input_path: &str) -> Result<Document, Error> {
    let (mut stdin_reader, mut file_reader);
    let input: &mut dyn Read = if input_path == "-" {
        stdin_reader = io::stdin();
        &mut stdin_reader
    } else {
        file_reader = File::open(input_path)
            .with_context(|| format!("failed to open input file '{}'", input_path))?;
        &mut file_reader
    };

    let mut contents = Vec::new();
    BufReader::new(input)
        .read_to_end(&mut contents)
        .with_context(|| format!("failed to read data from '{}'", input_path))?;

    let name = match input_path {
        "-" => "stdin".to_string(),
        path => Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("input path '{}' has no file name", path))?,
    };
    Ok(Document { name, contents })
}

fn seal(matches: &ArgMatches) -> Result<(), Error> {
    let algorithm = match matches.get_one::<String>("cipher").map(String::as_str) {
        Some("clear") => Algorithm::Clear,
        _ => Algorithm::Aead,
    };
    let output_path = matches
        .get_one::<String>("output")
        .context("required --output argument not provided")?;
    let inputs = matches
        .get_many::<String>("INPUT")
        .context("required INPUT argument not provided")?
        .map(|path| read_input(path))
        .collect::<Result<Vec<_>, _>>()?;

    let source = KeySource::from_matches(matches)?;
    let key_header = match source {
        KeySource::Password(_) => KeyHeader::pbkdf2(
            PBKDF2_HASH,
            PBKDF2_ITERATIONS,
            PBKDF2_KEY_LENGTH,
            PBKDF2_SALT_LENGTH,
        )?,
        KeySource::MasterKey(_) => KeyHeader::Direct,
    };

    let mut encoder = Encoder::new(output_path, key_header, Some(source.key_input()));
    for (i, document) in inputs.iter().enumerate() {
        let header = EncryptionHeader::new(
            algorithm,
            Position::for_index(i, inputs.len()),
            BlockSize::Bits256,
        )?;
        encoder
            .encrypt(header, document)
            .with_context(|| format!("sealing '{}'", document.name))?;
    }
    println!(
        "Sealed {} file(s) into {}.",
        encoder.blocks(),
        encoder.path().display()
    );

    Ok(())
}

// shardcrypt open (--password PW | --shares BUNDLE [--shares BUNDLE]...) [-o DIR] CONTAINER
fn open_cli() -> Command {
    key_source_args(
        Command::new("open")
            .about(r#"Open a container and write out every file sealed inside it."#)
            .arg(
                Arg::new("output")
                    .short('o')
                    .long("output")
                    .value_name("DIR")
                    .help("Directory to write the files to (defaults to the current directory).")
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("CONTAINER")
                    .help("Path to the container.")
                    .action(ArgAction::Set)
                    .required(true)
                    .index(1),
            ),
    )
}

fn open(matches: &ArgMatches) -> Result<(), Error> {
    let container_path = matches
        .get_one::<String>("CONTAINER")
        .context("required CONTAINER argument not provided")?;
    let outdir = PathBuf::from(
        matches
            .get_one::<String>("output")
            .map(String::as_str)
            .unwrap_or("."),
    );

    let (key_header, _) = filecrypt::inspect(BufReader::new(
        File::open(container_path)
            .with_context(|| format!("failed to open container '{}'", container_path))?,
    ))
    .with_context(|| format!("failed to read container '{}'", container_path))?;

    let source = KeySource::from_matches(matches)?;
    let key_input = match key_header.algorithm() {
        KeyAlgorithm::NoKey => None,
        algorithm => {
            ensure!(
                algorithm == source.key_algorithm(),
                "container '{}' is keyed with {:?} but a {} was provided",
                container_path,
                algorithm,
                match source {
                    KeySource::Password(_) => "password",
                    KeySource::MasterKey(_) => "set of shares",
                }
            );
            Some(source.key_input())
        }
    };

    let blocks = filecrypt::decrypt::<Document, _>(container_path, key_input)
        .with_context(|| format!("failed to decrypt container '{}'", container_path))?;

    fs::create_dir_all(&outdir)
        .with_context(|| format!("failed to create output directory {:?}", outdir))?;
    for (i, block) in blocks.into_iter().enumerate() {
        match block {
            Block::Payload(document) => {
                let name = Path::new(&document.name)
                    .file_name()
                    .ok_or_else(|| anyhow!("block {} has an invalid file name {:?}", i, document.name))?;
                let path = outdir.join(name);
                fs::write(&path, &document.contents)
                    .with_context(|| format!("failed to write {:?}", path))?;
                println!("{}", path.display());
            }
            Block::Digest(digest) => println!("block {}: digest {}", i, hex::encode(digest)),
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("SHARDCRYPT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn cli() -> Command {
    Command::new("shardcrypt")
        .version("0.0.0")
        .author("The shardcrypt Authors")
        .about("Seal files into encrypted containers whose key is split between custodians.")
        // shardcrypt split -t <THRESHOLD> -n <SHARES> [--field fr|fq] [--custodians C] OUTDIR
        .subcommand(split_cli())
        // shardcrypt seal (--password PW | --shares BUNDLE [--shares BUNDLE]...) [--cipher aes-gcm|clear] -o OUT INPUT...
        .subcommand(seal_cli())
        // shardcrypt open (--password PW | --shares BUNDLE [--shares BUNDLE]...) [-o DIR] CONTAINER
        .subcommand(open_cli())
        // shardcrypt inspect CONTAINER
        .subcommand(inspect::subcommand())
}

fn main() -> Result<(), Box<dyn StdError>> {
    init_logging();
    let mut app = cli();

    let ret = match app.get_matches_mut().subcommand() {
        Some(("split", sub_matches)) => split(sub_matches),
        Some(("seal", sub_matches)) => seal(sub_matches),
        Some(("open", sub_matches)) => open(sub_matches),
        Some(("inspect", sub_matches)) => inspect::submatch(sub_matches),
        Some((subcommand, _)) => {
            // We should never end up here.
            app.print_help()?;
            Err(anyhow!("unknown subcommand '{}'", subcommand))
        }
        None => {
            app.print_help()?;
            Err(anyhow!("no subcommand specified"))
        }
    }?;

    Ok(ret)
}

#[test]
fn verify_cli() {
    cli().debug_assert();
}
