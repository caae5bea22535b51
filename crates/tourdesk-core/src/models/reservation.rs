use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Reservado,
    Cancelado,
    NoShow,
    Confirmado,
    Realizado,
    Pagado,
    ComisionPendiente,
    ComisionPagada,
}

impl ReservationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ReservationStatus::Reservado => "Reservado",
            ReservationStatus::Cancelado => "Cancelado",
            ReservationStatus::NoShow => "No se presentó",
            ReservationStatus::Confirmado => "Confirmado",
            ReservationStatus::Realizado => "Realizado",
            ReservationStatus::Pagado => "Pagado",
            ReservationStatus::ComisionPendiente => "Comisión pendiente",
            ReservationStatus::ComisionPagada => "Comisión pagada",
        }
    }

    /// No further changes expected.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Cancelado | ReservationStatus::NoShow | ReservationStatus::ComisionPagada
        )
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
