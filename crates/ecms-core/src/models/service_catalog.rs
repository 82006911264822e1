//! Municipal service catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCatalogEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: String,
    /// 1-based display order.
    pub position: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A service seeded into every newly provisioned tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTemplate {
    pub name: String,
    pub description: String,
}

impl ServiceTemplate {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// The default municipal services every new tenant starts with.
pub fn baseline_services() -> Vec<ServiceTemplate> {
    vec![
        ServiceTemplate::new(
            "État Civil",
            "Actes de naissance, mariage, décès, livret de famille",
        ),
        ServiceTemplate::new(
            "Urbanisme",
            "Permis de construire, certificats d'urbanisme, lotissements",
        ),
        ServiceTemplate::new(
            "Affaires Sociales",
            "Aide sociale, handicap, personnes âgées",
        ),
        ServiceTemplate::new("Finances", "Taxes locales, impôts, budget communal"),
        ServiceTemplate::new(
            "Voirie et Environnement",
            "Entretien des routes, éclairage, propreté",
        ),
    ]
}
