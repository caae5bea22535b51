use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Supervisor,
    Vendedor,
    Guia,
    Transportista,
    Logistica,
    Cliente,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "Administrador",
            Role::Supervisor => "Supervisor",
            Role::Vendedor => "Vendedor",
            Role::Guia => "Guía",
            Role::Transportista => "Transportista",
            Role::Logistica => "Logística",
            Role::Cliente => "Cliente",
        }
    }

    /// Roles allowed to create and edit tours.
    pub fn can_manage_tours(&self) -> bool {
        matches!(self, Role::Admin | Role::Supervisor)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub active: bool,
    #[serde(rename = "commissionRate", default)]
    pub commission_rate: Option<f64>,
    #[serde(rename = "salesTarget", default)]
    pub sales_target: Option<f64>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}
