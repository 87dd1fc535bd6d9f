use std::fmt;

/// Which supply a meter measures. Selects the Octopus URL family and the
/// default unit of its readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterKind {
    Electricity,
    Gas,
}

impl MeterKind {
    pub fn default_unit(self) -> &'static str {
        match self {
            MeterKind::Electricity => "kWh",
            MeterKind::Gas => "m^3",
        }
    }

    /// Path segment of the meter-point collection in the Octopus API.
    pub fn meter_point_collection(self) -> &'static str {
        match self {
            MeterKind::Electricity => "electricity-meter-points",
            MeterKind::Gas => "gas-meter-points",
        }
    }
}

impl fmt::Display for MeterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeterKind::Electricity => f.write_str("electricity"),
            MeterKind::Gas => f.write_str("gas"),
        }
    }
}

/// One physical meter: MPAN/MPRN plus serial number.
///
/// The serial doubles as the emoncms input name, so it must be unique
/// across the meters synced into one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterDescriptor {
    pub kind: MeterKind,
    pub meter_point_id: String,
    pub serial: String,
    pub unit: String,
}

impl MeterDescriptor {
    pub fn new(kind: MeterKind, meter_point_id: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            kind,
            meter_point_id: meter_point_id.into(),
            serial: serial.into(),
            unit: kind.default_unit().to_string(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}
