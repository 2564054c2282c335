//! Print the `KubeAPIServer` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/kubeapiserver.yaml
//! ```

use anyhow::{Context, Result};
use bound_token_trust_controller::KubeAPIServer;
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let crd = KubeAPIServer::crd();
    let yaml = serde_yaml::to_string(&crd).context("Failed to serialize CRD")?;
    print!("{yaml}");
    Ok(())
}
