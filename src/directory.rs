use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{ClinicId, DoctorId};

/// Read-only view of doctors, clinics and who works where.
pub trait Directory: Send + Sync {
    fn is_affiliated(&self, doctor_id: DoctorId, clinic_id: ClinicId) -> bool;

    /// Distinct specializations of known doctors.
    fn specializations_in_use(&self) -> BTreeSet<String>;

    /// Clinics with at least one doctor of `specialization`.
    fn clinics_for(&self, specialization: &str) -> Vec<ClinicInfo>;

    /// Doctors of `specialization` working at `clinic_id`, by display name.
    fn doctors_at(&self, clinic_id: ClinicId, specialization: &str) -> Vec<DoctorInfo>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicInfo {
    pub id: ClinicId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorInfo {
    pub id: DoctorId,
    pub display_name: String,
}

// ── JSON document ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorRecord {
    pub id: DoctorId,
    pub first_name: String,
    pub last_name: String,
    pub specialization: String,
    #[serde(default)]
    pub clinics: Vec<ClinicId>,
}

impl DoctorRecord {
    /// "Last First", the form shown in booking choices.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name).trim().to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryData {
    #[serde(default)]
    pub clinics: Vec<ClinicInfo>,
    #[serde(default)]
    pub doctors: Vec<DoctorRecord>,
}

/// In-memory directory, typically loaded once at startup.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    clinics: HashMap<ClinicId, String>,
    doctors: Vec<DoctorRecord>,
    affiliations: HashSet<(DoctorId, ClinicId)>,
}

impl StaticDirectory {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_data(data: DirectoryData) -> Self {
        let clinics: HashMap<ClinicId, String> =
            data.clinics.into_iter().map(|c| (c.id, c.name)).collect();

        let mut affiliations = HashSet::new();
        let mut doctors = Vec::with_capacity(data.doctors.len());
        for mut doctor in data.doctors {
            doctor.clinics.retain(|cid| {
                let known = clinics.contains_key(cid);
                if !known {
                    warn!("directory: doctor {} lists unknown clinic {cid}", doctor.id);
                }
                known
            });
            for cid in &doctor.clinics {
                affiliations.insert((doctor.id, *cid));
            }
            doctors.push(doctor);
        }

        Self {
            clinics,
            doctors,
            affiliations,
        }
    }

    pub fn from_json(json: &str) -> io::Result<Self> {
        let data: DirectoryData = serde_json::from_str(json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self::from_data(data))
    }

    /// Load from a JSON file. A missing file yields an empty directory.
    pub fn load(path: &Path) -> io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("directory file {} not found, starting empty", path.display());
                Ok(Self::empty())
            }
            Err(e) => Err(e),
        }
    }

    pub fn doctor_count(&self) -> usize {
        self.doctors.len()
    }

    pub fn clinic_count(&self) -> usize {
        self.clinics.len()
    }
}

impl Directory for StaticDirectory {
    fn is_affiliated(&self, doctor_id: DoctorId, clinic_id: ClinicId) -> bool {
        self.affiliations.contains(&(doctor_id, clinic_id))
    }

    fn specializations_in_use(&self) -> BTreeSet<String> {
        self.doctors.iter().map(|d| d.specialization.clone()).collect()
    }

    fn clinics_for(&self, specialization: &str) -> Vec<ClinicInfo> {
        let ids: BTreeSet<ClinicId> = self
            .doctors
            .iter()
            .filter(|d| d.specialization == specialization)
            .flat_map(|d| d.clinics.iter().copied())
            .collect();
        let mut out: Vec<ClinicInfo> = ids
            .into_iter()
            .filter_map(|id| {
                self.clinics.get(&id).map(|name| ClinicInfo {
                    id,
                    name: name.clone(),
                })
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    fn doctors_at(&self, clinic_id: ClinicId, specialization: &str) -> Vec<DoctorInfo> {
        let mut out: Vec<DoctorInfo> = self
            .doctors
            .iter()
            .filter(|d| d.specialization == specialization && d.clinics.contains(&clinic_id))
            .map(|d| DoctorInfo {
                id: d.id,
                display_name: d.display_name(),
            })
            .collect();
        out.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.id.cmp(&b.id)));
        out
    }
}
