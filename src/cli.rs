//! # trustctl
//!
//! Read-only inspection of bound service account token trust material.
//!
//! ```bash
//! trustctl issuers
//! trustctl slots --target-namespace openshift-kube-apiserver
//! trustctl keys
//! trustctl revisions
//! ```

use anyhow::{Context, Result};
use bound_token_trust_controller::constants::{
    DEFAULT_KUBE_APISERVER_NAME, DEFAULT_OPERATOR_NAMESPACE, DEFAULT_TARGET_NAMESPACE,
};
use bound_token_trust_controller::controller::signing_key::{
    distinct_revisions, snapshot_contains_key,
};
use bound_token_trust_controller::crypto::fingerprint;
use bound_token_trust_controller::KubeAPIServer;
use chrono::Utc;
use clap::{Parser, Subcommand};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client};

/// Bound Token Trust Controller CLI
#[derive(Parser)]
#[command(name = "trustctl")]
#[command(about = "Inspect service account signing keys and accepted issuers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Namespace holding the next signing key secret
    #[arg(long, global = true, default_value = DEFAULT_OPERATOR_NAMESPACE)]
    operator_namespace: String,

    /// Namespace holding the promoted key, the trust store and its revision snapshots
    #[arg(long, global = true, default_value = DEFAULT_TARGET_NAMESPACE)]
    target_namespace: String,

    /// Name of the KubeAPIServer resource
    #[arg(long, global = true, default_value = DEFAULT_KUBE_APISERVER_NAME)]
    name: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active and still-trusted service account issuers
    Issuers,
    /// List trust store slots with their key fingerprints
    Slots,
    /// Compare the next and promoted signing keys
    Keys,
    /// Show which static pod revisions already trust the next signing key
    Revisions,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trustctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::Issuers => issuers_command(client, &cli.name).await,
        Commands::Slots => slots_command(client, &cli.target_namespace).await,
        Commands::Keys => {
            keys_command(client, &cli.operator_namespace, &cli.target_namespace).await
        }
        Commands::Revisions => {
            revisions_command(
                client,
                &cli.operator_namespace,
                &cli.target_namespace,
                &cli.name,
            )
            .await
        }
    }
}

async fn get_kube_apiserver(client: Client, name: &str) -> Result<KubeAPIServer> {
    let api: Api<KubeAPIServer> = Api::all(client);
    api.get(name)
        .await
        .with_context(|| format!("Failed to get KubeAPIServer '{name}'"))
}

/// Public key PEM of a signing key secret, `None` when the secret or key is missing
async fn public_key(client: Client, namespace: &str, name: &str) -> Result<Option<Vec<u8>>> {
    let api: Api<Secret> = Api::namespaced(client, namespace);
    let secret = api
        .get_opt(name)
        .await
        .with_context(|| format!("Failed to get Secret '{namespace}/{name}'"))?;
    Ok(secret
        .and_then(|s| s.data)
        .and_then(|mut data| data.remove(names::PUBLIC_KEY_KEY))
        .map(|bytes| bytes.0)
        .filter(|bytes| !bytes.is_empty()))
}

async fn issuers_command(client: Client, name: &str) -> Result<()> {
    let kas = get_kube_apiserver(client, name).await?;

    let configured = kas.configured_issuer();
    println!(
        "Configured issuer: {}",
        if configured.is_empty() { "<default>" } else { configured }
    );

    let issuers = kas.service_account_issuers();
    if issuers.is_empty() {
        println!("No service account issuers recorded in status.");
        return Ok(());
    }

    let now = Utc::now();
    println!("\n{:<50} {:<10} {:<25}", "ISSUER", "STATE", "EXPIRES");
    println!("{}", "-".repeat(85));
    for issuer in issuers {
        let (state, expires) = match issuer.expiration_time {
            None => ("active", "-".to_string()),
            Some(t) if t <= now => ("expired", t.to_rfc3339()),
            Some(t) => ("trusted", t.to_rfc3339()),
        };
        println!("{:<50} {:<10} {:<25}", issuer.name, state, expires);
    }

    Ok(())
}

async fn slots_command(client: Client, target_namespace: &str) -> Result<()> {
    let api: Api<ConfigMap> = Api::namespaced(client, target_namespace);
    let trust_store = api
        .get_opt(names::TRUST_STORE_CONFIG_MAP)
        .await
        .with_context(|| {
            format!(
                "Failed to get ConfigMap '{}/{}'",
                target_namespace,
                names::TRUST_STORE_CONFIG_MAP
            )
        })?;

    let Some(data) = trust_store.and_then(|cm| cm.data).filter(|d| !d.is_empty()) else {
        println!("Trust store is empty.");
        return Ok(());
    };

    println!("\n{:<35} {:<25}", "SLOT", "FINGERPRINT");
    println!("{}", "-".repeat(60));
    for (slot, pem) in &data {
        let marker = if names::parse_slot_index(slot).is_some() {
            ""
        } else {
            " (not a slot)"
        };
        println!("{:<35} {:<25}{}", slot, fingerprint(pem.as_bytes()), marker);
    }

    Ok(())
}

async fn keys_command(
    client: Client,
    operator_namespace: &str,
    target_namespace: &str,
) -> Result<()> {
    let next = public_key(
        client.clone(),
        operator_namespace,
        names::NEXT_SIGNING_KEY_SECRET,
    )
    .await?;
    let current = public_key(client, target_namespace, names::SIGNING_KEY_SECRET).await?;

    let describe = |key: &Option<Vec<u8>>| {
        key.as_deref()
            .map(fingerprint)
            .unwrap_or_else(|| "<missing>".to_string())
    };
    println!(
        "Next key     ({}/{}): {}",
        operator_namespace,
        names::NEXT_SIGNING_KEY_SECRET,
        describe(&next)
    );
    println!(
        "Promoted key ({}/{}): {}",
        target_namespace,
        names::SIGNING_KEY_SECRET,
        describe(&current)
    );

    match (next, current) {
        (None, _) => println!("\nNo next key yet; the controller has not run."),
        (Some(_), None) => println!("\nNext key is waiting to be installed as the first signing key."),
        (Some(next), Some(current)) if next == current => println!("\nPromoted: keys match."),
        (Some(_), Some(_)) => println!("\nPending promotion: see `trustctl revisions`."),
    }

    Ok(())
}

async fn revisions_command(
    client: Client,
    operator_namespace: &str,
    target_namespace: &str,
    name: &str,
) -> Result<()> {
    let kas = get_kube_apiserver(client.clone(), name).await?;
    let Some(next) = public_key(
        client.clone(),
        operator_namespace,
        names::NEXT_SIGNING_KEY_SECRET,
    )
    .await?
    else {
        println!("No next key yet; nothing to propagate.");
        return Ok(());
    };
    let next = String::from_utf8(next).context("Next public key is not valid UTF-8")?;

    let revisions = distinct_revisions(kas.node_statuses());
    if revisions.is_empty() {
        println!("No node statuses recorded; promotion is blocked.");
        return Ok(());
    }

    let api: Api<ConfigMap> = Api::namespaced(client, target_namespace);
    println!("\n{:<10} {:<45} {:<10}", "REVISION", "SNAPSHOT", "HAS KEY");
    println!("{}", "-".repeat(65));
    let mut all_synced = true;
    for revision in revisions {
        let snapshot_name = names::revision_trust_store_name(revision);
        let snapshot = api
            .get_opt(&snapshot_name)
            .await
            .with_context(|| format!("Failed to get ConfigMap '{target_namespace}/{snapshot_name}'"))?;
        let state = match snapshot {
            None => "missing",
            Some(cm) if snapshot_contains_key(&cm, &next) => "yes",
            Some(_) => "no",
        };
        all_synced &= state == "yes";
        println!("{:<10} {:<45} {:<10}", revision, snapshot_name, state);
    }

    println!(
        "\n{}",
        if all_synced {
            "Every revision trusts the next key."
        } else {
            "Promotion waits until every revision trusts the next key."
        }
    );

    Ok(())
}
