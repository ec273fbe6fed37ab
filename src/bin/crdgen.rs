//! Prints the CustomResourceDefinitions as a multi-document YAML stream.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/all.yaml
//! ```

use kube::CustomResourceExt;
use workset_controller::crd::{DeliveryWork, Placement, PlacementDecision, WorkReplicaSet};

fn main() -> anyhow::Result<()> {
    let crds = [
        WorkReplicaSet::crd(),
        DeliveryWork::crd(),
        Placement::crd(),
        PlacementDecision::crd(),
    ];

    let documents = crds
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    print!("{}", documents.join("---\n"));
    Ok(())
}
