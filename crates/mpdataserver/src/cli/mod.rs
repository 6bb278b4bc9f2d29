//! CLI argument parsing and command dispatch.

pub mod args;

use anyhow::{Context, Result};
use args::{Cli, Commands, InspectArgs};
use clap::Parser;
use mpdata_identity::{
    inspect_certificate, verify_chain, CertificateInfo, DirStore, IdentityBundle, Provisioned,
};
use serde::Serialize;

use crate::config::ServerConfig;
use crate::{logging, server};

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format, cli.verbose);

    let mut config = ServerConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => server::run(&config).await?,
        Commands::Provision => provision(&config).await?,
        Commands::Inspect(args) => inspect(&config, &args)?,
    }

    Ok(())
}

async fn provision(config: &ServerConfig) -> Result<()> {
    let dir = config.identity_dir.display();
    match server::provision_identity(config).await? {
        Provisioned::Reused => println!("identity already present in {dir}, nothing to do"),
        Provisioned::Generated(_) => println!("issued new CA and leaf certificate in {dir}"),
    }
    Ok(())
}

#[derive(Serialize)]
struct InspectReport {
    ca: CertificateInfo,
    leaf: CertificateInfo,
    chain_valid: bool,
    chain_error: Option<String>,
}

fn inspect(config: &ServerConfig, args: &InspectArgs) -> Result<()> {
    let store = DirStore::new(&config.identity_dir);
    let bundle = IdentityBundle::load(&store)
        .with_context(|| format!("reading identity from {}", config.identity_dir.display()))?;

    let chain = verify_chain(&bundle.leaf_cert_pem, &bundle.ca_cert_pem);
    let report = InspectReport {
        ca: inspect_certificate(&bundle.ca_cert_pem).context("parsing ca.pem")?,
        leaf: inspect_certificate(&bundle.leaf_cert_pem).context("parsing cert.pem")?,
        chain_valid: chain.is_ok(),
        chain_error: chain.err().map(|e| e.to_string()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_certificate("CA (ca.pem)", &report.ca);
    print_certificate("Leaf (cert.pem)", &report.leaf);
    match &report.chain_error {
        None => println!("Chain: cert.pem verifies against ca.pem"),
        Some(e) => println!("Chain: INVALID ({e})"),
    }
    Ok(())
}

fn print_certificate(title: &str, info: &CertificateInfo) {
    println!("{title}");
    println!("  Subject:      {}", info.subject);
    println!("  Issuer:       {}", info.issuer);
    println!("  Serial:       {}", info.serial);
    println!("  Not before:   {}", info.not_before);
    println!("  Not after:    {}", info.not_after);
    println!("  Type:         {:?}", info.cert_type);
    println!("  Server auth:  {}", info.server_auth);
    println!("  Fingerprint:  {}", info.fingerprint);
}
