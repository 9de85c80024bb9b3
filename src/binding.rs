use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::constants::{DEVICE_OWNER_BAREMETAL, VNIC_TYPE_BAREMETAL};
use crate::error::BindingError;
use crate::fs::atomic_write;
use crate::inventory::{
    AttachmentSubnet, BindingTarget, Inventory, LocalLinkConnection, VirtualAttachment,
};
use crate::mac::MacAddress;
use crate::synth::distribute_attachments;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Unbound,
    Provisioning,
    Cleaning,
    Tenant,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unbound => "unbound",
            Self::Provisioning => "provisioning",
            Self::Cleaning => "cleaning",
            Self::Tenant => "tenant",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct BindingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<MacAddress>,
    pub device_owner: String,
    pub device_id: String,
    pub host_id: String,
    pub vnic_type: String,
    pub admin_state_up: bool,
    pub local_link_information: Vec<LocalLinkConnection>,
}

impl BindingRequest {
    /// A port group carries the switch connection of every member.
    pub fn for_target(
        inventory: &Inventory,
        target: &BindingTarget,
        device_id: &str,
        host_id: &str,
    ) -> Option<Self> {
        let (mac_address, local_link_information) = match target {
            BindingTarget::Port(id) => {
                let port = inventory.port(id)?;
                (
                    Some(port.mac_address),
                    port.local_link_connection.iter().cloned().collect(),
                )
            }
            BindingTarget::PortGroup(id) => {
                let group = inventory.port_group(id)?;
                (
                    group.mac_address,
                    inventory
                        .members(id)
                        .filter_map(|p| p.local_link_connection.clone())
                        .collect(),
                )
            }
        };
        Some(Self {
            network_id: None,
            mac_address,
            device_owner: DEVICE_OWNER_BAREMETAL.into(),
            device_id: device_id.into(),
            host_id: host_id.into(),
            vnic_type: VNIC_TYPE_BAREMETAL.into(),
            admin_state_up: true,
            local_link_information,
        })
    }

    pub fn with_network(mut self, network_id: &str) -> Self {
        self.network_id = Some(network_id.into());
        self
    }
}

/// The external port management service.
pub trait BindingApi {
    /// Create a binding, returning its VIF id.
    fn create(&mut self, request: &BindingRequest) -> Result<String, BindingError>;
    fn update(&mut self, vif_id: &str, request: &BindingRequest) -> Result<(), BindingError>;
    fn delete(&mut self, vif_id: &str) -> Result<(), BindingError>;
}

fn now() -> DateTime<Utc> {
    SystemTime::now().into()
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Binding {
    pub target: BindingTarget,
    pub phase: Phase,
    pub vif_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created(String),
    Updated(String),
    Deleted(String),
    AlreadyBound(String),
    AlreadyAbsent(String),
    Failed {
        vif_id: Option<String>,
        error: BindingError,
    },
}

impl Outcome {
    fn failed(vif_id: Option<&str>, error: BindingError) -> Self {
        Self::Failed {
            vif_id: vif_id.map(String::from),
            error,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<(BindingTarget, Outcome)>,
}

impl BatchReport {
    fn push(&mut self, target: &BindingTarget, outcome: Outcome) {
        match &outcome {
            Outcome::Failed { error, .. } => warn!("Binding on {} failed: {}", target, error),
            outcome => debug!("Binding on {}: {:?}", target, outcome),
        }
        self.outcomes.push((target.clone(), outcome));
    }

    pub fn failed_targets(&self) -> BTreeSet<&BindingTarget> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_failure())
            .map(|(target, _)| target)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        !self.outcomes.iter().any(|(_, outcome)| outcome.is_failure())
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct BindingTracker {
    #[serde(default)]
    bindings: Vec<Binding>,
}

impl BindingTracker {
    /// Load tracker state, starting empty if the file does not exist yet.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data)
                .map_err(|e| anyhow!("unable to parse binding state {:?}: {}", path, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow!("unable to read {:?}: {}", path, e)),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| anyhow!("unable to serialize binding state: {}", e))?;
        atomic_write(path, |mut f| {
            f.write_all(&data)?;
            Ok(())
        })
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn in_phase(&self, phase: Phase) -> impl Iterator<Item = &Binding> {
        self.bindings.iter().filter(move |b| b.phase == phase)
    }

    pub fn vifs(&self, target: &BindingTarget) -> BTreeSet<&str> {
        self.bindings
            .iter()
            .filter(|b| &b.target == target)
            .map(|b| b.vif_id.as_str())
            .collect()
    }

    /// The phase a target's bindings are in, `Unbound` if it has none.
    pub fn phase_of(&self, target: &BindingTarget) -> Phase {
        self.bindings
            .iter()
            .find(|b| &b.target == target)
            .map_or(Phase::Unbound, |b| b.phase)
    }

    /// A target already bound in `phase` on the same network is left alone.
    pub fn attach(
        &mut self,
        api: &mut dyn BindingApi,
        phase: Phase,
        requests: &[(BindingTarget, BindingRequest)],
    ) -> Result<BatchReport, BindingError> {
        if phase == Phase::Unbound {
            return Err(BindingError::InvalidTransition {
                from: Phase::Unbound,
                to: phase,
            });
        }
        info!("Attaching {} targets for {}", requests.len(), phase);
        let mut report = BatchReport::default();
        for (target, request) in requests {
            if let Some(existing) = self.bindings.iter().find(|b| {
                &b.target == target && b.phase == phase && b.network_id == request.network_id
            }) {
                report.push(target, Outcome::AlreadyBound(existing.vif_id.clone()));
                continue;
            }
            match api.create(request) {
                Ok(vif_id) => {
                    self.bindings.push(Binding {
                        target: target.clone(),
                        phase,
                        vif_id: vif_id.clone(),
                        network_id: request.network_id.clone(),
                        updated_at: now(),
                    });
                    report.push(target, Outcome::Created(vif_id));
                }
                Err(e) => report.push(target, Outcome::failed(None, e)),
            }
        }
        Ok(report)
    }

    /// Delete every binding in `phase`. A binding whose delete fails stays
    /// tracked so a later detach retries it.
    pub fn detach(&mut self, api: &mut dyn BindingApi, phase: Phase) -> BatchReport {
        let (detached, kept): (Vec<Binding>, Vec<Binding>) = std::mem::take(&mut self.bindings)
            .into_iter()
            .partition(|b| b.phase == phase);
        self.bindings = kept;

        info!("Detaching {} bindings for {}", detached.len(), phase);
        let mut report = BatchReport::default();
        for binding in detached {
            let outcome = match api.delete(&binding.vif_id) {
                Ok(()) => Outcome::Deleted(binding.vif_id.clone()),
                Err(BindingError::NotFound(_)) => Outcome::AlreadyAbsent(binding.vif_id.clone()),
                Err(e) => Outcome::failed(Some(binding.vif_id.as_str()), e),
            };
            report.push(&binding.target, outcome.clone());
            if outcome.is_failure() {
                self.bindings.push(binding);
            }
        }
        report
    }

    /// Bindings whose update fails stay in `from`.
    pub fn transition<F>(
        &mut self,
        api: &mut dyn BindingApi,
        from: Phase,
        to: Phase,
        request_for: F,
    ) -> Result<BatchReport, BindingError>
    where
        F: Fn(&BindingTarget) -> Option<BindingRequest>,
    {
        if from == to || from == Phase::Unbound || to == Phase::Unbound {
            return Err(BindingError::InvalidTransition { from, to });
        }
        info!("Moving bindings from {} to {}", from, to);
        let mut report = BatchReport::default();
        for binding in self.bindings.iter_mut().filter(|b| b.phase == from) {
            let Some(request) = request_for(&binding.target) else {
                let error = BindingError::NoRequest(binding.target.to_string());
                let outcome = Outcome::failed(Some(binding.vif_id.as_str()), error);
                report.push(&binding.target, outcome);
                continue;
            };
            match api.update(&binding.vif_id, &request) {
                Ok(()) => {
                    binding.phase = to;
                    binding.network_id = request.network_id.clone();
                    binding.updated_at = now();
                    report.push(&binding.target, Outcome::Updated(binding.vif_id.clone()));
                }
                Err(e) => {
                    report.push(&binding.target, Outcome::failed(Some(binding.vif_id.as_str()), e))
                }
            }
        }
        Ok(report)
    }

    /// Record tenant VIFs created elsewhere. VIFs already tracked keep their target.
    pub fn plug(
        &mut self,
        inventory: &Inventory,
        vif_ids: &[String],
    ) -> Vec<(String, BindingTarget)> {
        let known: BTreeSet<String> = self.all_vifs().into_iter().map(String::from).collect();
        let new: Vec<String> = vif_ids
            .iter()
            .filter(|vif| !known.contains(*vif))
            .cloned()
            .collect();
        let plugged = distribute_attachments(inventory, &new);
        for (vif_id, target) in &plugged {
            info!("Plugged VIF {} on {}", vif_id, target);
            self.bindings.push(Binding {
                target: target.clone(),
                phase: Phase::Tenant,
                vif_id: vif_id.clone(),
                network_id: None,
                updated_at: now(),
            });
        }
        plugged
    }

    /// Forget VIFs. Ids that are not tracked are ignored.
    pub fn unplug(&mut self, vif_ids: &[String]) -> Vec<Binding> {
        let (removed, kept): (Vec<Binding>, Vec<Binding>) = std::mem::take(&mut self.bindings)
            .into_iter()
            .partition(|b| vif_ids.contains(&b.vif_id));
        self.bindings = kept;
        for binding in &removed {
            info!("Unplugged VIF {} from {}", binding.vif_id, binding.target);
        }
        removed
    }

    pub fn targets(&self) -> BTreeSet<&BindingTarget> {
        self.bindings.iter().map(|b| &b.target).collect()
    }

    pub fn all_vifs(&self) -> BTreeSet<&str> {
        self.targets()
            .into_iter()
            .flat_map(|target| self.vifs(target))
            .collect()
    }

    pub fn tenant_attachments<F>(
        &self,
        segmentation_id: F,
    ) -> Result<Vec<VirtualAttachment>, BindingError>
    where
        F: Fn(&str) -> Option<u16>,
    {
        self.in_phase(Phase::Tenant)
            .map(|binding| -> Result<VirtualAttachment, BindingError> {
                let tag = segmentation_id(&binding.vif_id)
                    .ok_or_else(|| BindingError::NoSegmentationId(binding.vif_id.clone()))?;
                Ok(VirtualAttachment {
                    vif_id: binding.vif_id.clone(),
                    segmentation_id: tag,
                    target: binding.target.clone(),
                    network_id: binding.network_id.clone(),
                    subnet: AttachmentSubnet::Dhcp,
                })
            })
            .collect()
    }
}
