use std::collections::BTreeMap;

use crate::device::DeviceIdentity;
use crate::registers::Attribute;

/// Functional grouping an exposed attribute belongs to. Host applications use
/// this to decide which kind of control to build around the attribute.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    strum::Display, strum::EnumString, serde::Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TargetCategory {
    Climate,
    WaterHeater,
    Sensor,
    BinarySensor,
    Select,
    Number,
    Switch,
    Button,
}

/// Runtime-probed features an attribute may additionally require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureGate {
    Co2,
}

#[derive(Debug, Clone, Copy)]
pub enum Devices {
    All,
    Only(&'static [i16]),
}

impl Devices {
    fn matches(&self, hardware_type: i16) -> bool {
        match self {
            Devices::All => true,
            Devices::Only(codes) => codes.contains(&hardware_type),
        }
    }
}

/// Inclusive bus version bounds; a missing bound is unbounded on that side.
/// An explicit exclusion list overrides a min/max match.
#[derive(Debug, Clone, Copy)]
pub struct VersionBounds {
    pub min: Option<i16>,
    pub max: Option<i16>,
    pub excluded: &'static [i16],
}

impl VersionBounds {
    fn admits(&self, bus_version: i16) -> bool {
        if let Some(min) = self.min {
            if bus_version < min {
                return false;
            }
        }
        if let Some(max) = self.max {
            if bus_version > max {
                return false;
            }
        }
        !self.excluded.contains(&bus_version)
    }
}

/// One row of the capability table.
///
/// A rule carries up to two bounds sets: `standard` for regular CTS602
/// control boards and `alternate` for the AIR/GEO/HPS boards. Exactly one of
/// the two is consulted for a given unit, selected by its variant.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityRule {
    pub attribute: Attribute,
    pub category: TargetCategory,
    pub devices: Devices,
    pub standard: Option<VersionBounds>,
    pub alternate: Option<VersionBounds>,
    pub gate: Option<FeatureGate>,
}

const UNBOUNDED: VersionBounds = VersionBounds { min: None, max: None, excluded: &[] };

impl CapabilityRule {
    pub const fn new(attribute: Attribute, category: TargetCategory) -> Self {
        Self {
            attribute,
            category,
            devices: Devices::All,
            standard: None,
            alternate: None,
            gate: None,
        }
    }

    pub const fn devices(mut self, codes: &'static [i16]) -> Self {
        self.devices = Devices::Only(codes);
        self
    }

    /// Expose on standard boards from this bus version on.
    pub const fn std(mut self, min: i16) -> Self {
        self.standard = Some(VersionBounds { min: Some(min), ..UNBOUNDED });
        self
    }

    /// Expose on standard boards within an inclusive bus version window.
    pub const fn std_range(mut self, min: i16, max: i16) -> Self {
        self.standard = Some(VersionBounds { min: Some(min), max: Some(max), excluded: &[] });
        self
    }

    /// Expose on standard boards regardless of bus version.
    pub const fn std_any(mut self) -> Self {
        self.standard = Some(UNBOUNDED);
        self
    }

    /// Blacklist bus versions from the standard bounds.
    pub const fn excluding(mut self, versions: &'static [i16]) -> Self {
        self.standard = match self.standard {
            Some(bounds) => Some(VersionBounds { excluded: versions, ..bounds }),
            None => Some(VersionBounds { excluded: versions, ..UNBOUNDED }),
        };
        self
    }

    /// Expose on AIR/GEO/HPS boards from this HPS bus version on.
    pub const fn hps(mut self, min: i16) -> Self {
        self.alternate = Some(VersionBounds { min: Some(min), ..UNBOUNDED });
        self
    }

    pub const fn gated(mut self, gate: FeatureGate) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// Units with a domestic hot water tank.
const WATER_HEATER_UNITS: &[i16] = &[9, 10, 11, 12, 28, 44];
/// Units with a hydronic central heating circuit.
const CENTRAL_HEAT_UNITS: &[i16] = &[21, 22, 23, 28, 44];
/// The VP 18 family, whose early firmware shipped a fixed capability table.
const VP18_FAMILY: &[i16] = &[9, 10, 11, 12];

const fn rule(attribute: Attribute, category: TargetCategory) -> CapabilityRule {
    CapabilityRule::new(attribute, category)
}

/// The capability table.
///
/// Row order is load-bearing: rules are evaluated top to bottom and a later
/// matching row for the same attribute replaces the earlier assignment.
/// `machine_type`, `app_version_minor` and `co2_sensor_present` carry no rows
/// on purpose: they are discovery probes, not exposed attributes.
pub static RULES: &[CapabilityRule] = {
    use Attribute as A;
    use TargetCategory as T;
    &[
        // Identity and diagnostics.
        rule(A::BusVersion, T::Sensor).std(1).hps(1),
        rule(A::ControllerSoftwareVersion, T::Sensor).std(1).hps(1),
        rule(A::ControllerHardwareVersion, T::Sensor).std(8).hps(1),

        // Climate control.
        rule(A::RunState, T::Climate).std(1).hps(1),
        rule(A::OperationMode, T::Climate).std(1).hps(1),
        rule(A::VentilationStep, T::Climate).std(1).hps(1),
        rule(A::UserTemperatureSetpoint, T::Climate).std(1).hps(1),
        rule(A::UserHumiditySetpoint, T::Climate).std(6),
        rule(A::AirExchangeMode, T::Climate).devices(&[9, 10, 11, 12, 28, 44]).std(4),
        rule(A::ControlState, T::Sensor).std(1).hps(1),
        rule(A::RoomMasterTemperature, T::Climate).std(1),
        rule(A::VentilationState, T::Sensor).std(10),
        rule(A::InletSpeedStep, T::Climate).std(1),

        // Temperature probes.
        rule(A::T0ControllerTemperature, T::Sensor).std(1),
        rule(A::T1IntakeTemperature, T::Sensor).std(1).hps(1),
        rule(A::T2InletTemperature, T::Sensor).std(1).hps(1),
        rule(A::T3ExhaustTemperature, T::Sensor).std(1).hps(1),
        rule(A::T4OutletTemperature, T::Sensor).std(1).hps(1),
        rule(A::T5CondenserTemperature, T::Sensor).std(1),
        rule(A::T6EvaporatorTemperature, T::Sensor).std(1),
        rule(A::T7InletAfterHeaterTemperature, T::Sensor).std(1),
        rule(A::T8OutdoorTemperature, T::Sensor).std(1).hps(1),
        rule(A::T10ExternalTemperature, T::Sensor).std(5),
        rule(A::T11ElectricWaterHeaterTemperature, T::WaterHeater)
            .devices(WATER_HEATER_UNITS)
            .std(1)
            .hps(1),
        rule(A::T12CompressorWaterHeaterTemperature, T::WaterHeater)
            .devices(WATER_HEATER_UNITS)
            .std(1)
            .hps(1),
        rule(A::T13ReturnTemperature, T::Sensor).devices(CENTRAL_HEAT_UNITS).std(4),
        rule(A::T14SupplyTemperature, T::Sensor).devices(CENTRAL_HEAT_UNITS).std(4),
        rule(A::T15RoomTemperature, T::Sensor).std(1),
        rule(A::T16SacrificialAnodeTemperature, T::Sensor).devices(&[9, 10, 44]).std(6),

        // Air quality and fan telemetry.
        rule(A::Humidity, T::Sensor).std(1).hps(1),
        rule(A::Co2SensorValue, T::Sensor).std(10).hps(1).gated(FeatureGate::Co2),
        rule(A::AverageHumidity, T::Sensor).std(10),
        rule(A::SupplyFanLevel, T::Sensor).std(1).hps(1),
        rule(A::ReturnFanLevel, T::Sensor).std(1).hps(1),
        rule(A::ReturnFanSpeed, T::Sensor).std(5).hps(1),
        rule(A::SupplyFanSpeed, T::Sensor).std(5).hps(1),
        rule(A::DaysSinceAirFilterChange, T::Sensor).std(8),
        rule(A::DaysToAirFilterChange, T::Sensor).std(10),
        rule(A::SummerState, T::Sensor).std(1),
        rule(A::TimeInControlState, T::Sensor).std(10),
        rule(A::AirTempEffPct, T::Sensor).std(5),
        rule(A::AfterHeatingElementCapacity, T::Sensor).devices(&[28]).std_any(),
        rule(A::AfterHeatingType, T::Sensor).std(8),
        rule(A::AnodeState, T::Sensor)
            .devices(WATER_HEATER_UNITS)
            .std(4)
            .excluding(&[11, 12]),

        // Alarms.
        rule(A::AlarmCount, T::Sensor).std(1),
        rule(A::Alarm1Code, T::Sensor).std(1),
        rule(A::Alarm1Date, T::Sensor).std(1),
        rule(A::Alarm1Time, T::Sensor).std(1),
        rule(A::Alarm2Code, T::Sensor).std(1),
        rule(A::Alarm2Date, T::Sensor).std(1),
        rule(A::Alarm2Time, T::Sensor).std(1),
        rule(A::Alarm3Code, T::Sensor).std(1),
        rule(A::Alarm3Date, T::Sensor).std(1),
        rule(A::Alarm3Time, T::Sensor).std(1),
        rule(A::HpsAlarmCount, T::Sensor).hps(1),

        // Old HMI mirror and device clock. The text/LED mirror went away with
        // the touch panel generation.
        rule(A::DisplayLed1State, T::BinarySensor).std_range(1, 19),
        rule(A::DisplayLed2State, T::BinarySensor).std_range(1, 19),
        rule(A::DisplayText1, T::Sensor).std_range(1, 19),
        rule(A::DisplayText2, T::Sensor).std_range(1, 19),
        rule(A::Time, T::Sensor).std(1).hps(1),

        // Relay and digital input state.
        rule(A::CirculationPumpState, T::BinarySensor).std(1),
        rule(A::HeaterRelay1State, T::BinarySensor).devices(VP18_FAMILY).std_any(),
        rule(A::HeaterRelay2State, T::BinarySensor).devices(VP18_FAMILY).std_any(),
        rule(A::HeaterRelay3State, T::BinarySensor).devices(VP18_FAMILY).std_any(),
        rule(A::CompressorState, T::BinarySensor).std(1),
        rule(A::UserFunction1State, T::BinarySensor).std(5),
        rule(A::SmokeAlarmState, T::BinarySensor).std(1),
        rule(A::DefrostState, T::BinarySensor).std(1),
        rule(A::UserFunction2State, T::BinarySensor).std(10),
        rule(A::BypassFlapState, T::BinarySensor).std(5),

        // Mode selections.
        rule(A::CoolingModeVentilationStep, T::Select).std(5),
        rule(A::CoolingSetpoint, T::Select).std(5),
        rule(A::MinSupplyStep, T::Select).std(1),
        rule(A::MinReturnStep, T::Select).std(1),
        rule(A::MaxReturnStep, T::Select).std(8),
        rule(A::LowHumidityStep, T::Select).std(6),
        rule(A::HighHumidityStep, T::Select).std(6),
        rule(A::Co2VentilationHighStep, T::Select).std(10).gated(FeatureGate::Co2),
        rule(A::AirQualityControlType, T::Select).std(10),
        rule(A::AirFilterAlarmInterval, T::Select).std(1).hps(1),
        rule(A::LegionellaDay, T::Select).devices(WATER_HEATER_UNITS).std(4),
        rule(A::LowOutdoorTemperatureVentilationStep, T::Select).std(8),
        rule(A::DefrostVentilationLevel, T::Select).std(8),
        rule(A::CentralHeatType, T::Select).devices(CENTRAL_HEAT_UNITS).std(4),
        rule(A::CentralHeatSelect, T::Select).devices(CENTRAL_HEAT_UNITS).std(4),
        rule(A::AirHeatSelect, T::Select).std(8),
        rule(A::PreHeaterDefrostSelect, T::Select).std(10),
        rule(A::PreHeaterTempSet, T::Select).std(10),
        rule(A::HmiLanguage, T::Select).std_range(1, 19),
        rule(A::CirculationPumpMode, T::Select).devices(CENTRAL_HEAT_UNITS).std(4),
        rule(A::CompressorPriority, T::Select).devices(WATER_HEATER_UNITS).std(1),
        // The user menu register is a plain indicator on old firmware and
        // became writable with bus version 8; the later row wins there.
        rule(A::UserMenuState, T::Sensor).std(1),
        rule(A::UserMenuState, T::Select).std(8),

        // Numeric configuration.
        rule(A::SupplyPowerAtLevel1, T::Number).std(5).hps(1),
        rule(A::SupplyPowerAtLevel2, T::Number).std(5).hps(1),
        rule(A::SupplyPowerAtLevel3, T::Number).std(5).hps(1),
        rule(A::SupplyPowerAtLevel4, T::Number).std(5).hps(1),
        rule(A::ReturnPowerAtLevel1, T::Number).std(5).hps(1),
        rule(A::ReturnPowerAtLevel2, T::Number).std(5).hps(1),
        rule(A::ReturnPowerAtLevel3, T::Number).std(5).hps(1),
        rule(A::ReturnPowerAtLevel4, T::Number).std(5).hps(1),
        rule(A::FanStartupDelay, T::Number).std(8),
        rule(A::MinimumDefrostTime, T::Number).std(8),
        rule(A::MaximumOutletDefrostTime, T::Number).std(8),
        rule(A::MaximumCompressorDefrostTime, T::Number).std(8),
        rule(A::TimeBetweenDefrost, T::Number).std(8),
        rule(A::SupplyHeaterDelay, T::Number).std(8),
        rule(A::CentralHeatSupplyCurve, T::Number).devices(CENTRAL_HEAT_UNITS).std(4),
        rule(A::CompressorStopTime, T::Number).std(5),
        rule(A::Co2LowLimitSetpoint, T::Number).std(10).gated(FeatureGate::Co2),
        rule(A::Co2HighLimitSetpoint, T::Number).std(10).gated(FeatureGate::Co2),
        rule(A::MaxHighHumidityVentTime, T::Number).std(6),
        rule(A::SupplyHeatingPidTime, T::Number).devices(CENTRAL_HEAT_UNITS).std(4),
        rule(A::LowTemperatureCurve, T::Number).std(6),
        rule(A::HighTemperatureCurve, T::Number).std(6),
        rule(A::LowTemperatureCompressorStartSetpoint, T::Number).std(6),
        rule(A::ExternalHeatingOffset, T::Number).devices(CENTRAL_HEAT_UNITS).std(4),
        rule(A::ChMinSupplyTemperature, T::Number).devices(CENTRAL_HEAT_UNITS).std(4),
        rule(A::ChMaxSupplyTemperature, T::Number).devices(CENTRAL_HEAT_UNITS).std(4),
        rule(A::CentralHeatSupplyCurveOffset, T::Number).devices(CENTRAL_HEAT_UNITS).std(4),
        rule(A::DefrostStartSetpoint, T::Number).std(8),
        rule(A::DefrostStopSetpoint, T::Number).std(8),
        rule(A::MinSupplyAirSummerSetpoint, T::Number).std(5),
        rule(A::MinSupplyAirWinterSetpoint, T::Number).std(5),
        rule(A::MaxSupplyAirSummerSetpoint, T::Number).std(5),
        rule(A::MaxSupplyAirWinterSetpoint, T::Number).std(5),
        rule(A::SummerStateChangeSetpoint, T::Number).std(5),
        rule(A::LowOutdoorTemperatureSetpoint, T::Number).std(8),
        rule(A::LowRoomTemperatureSetpoint, T::Number).std(8),
        rule(A::ScaldingProtectionSetpoint, T::Number).devices(WATER_HEATER_UNITS).std(6),

        // Water heater setpoints.
        rule(A::ElectricWaterHeaterSetpoint, T::WaterHeater)
            .devices(WATER_HEATER_UNITS)
            .std(1),
        rule(A::CompressorWaterHeaterSetpoint, T::WaterHeater)
            .devices(WATER_HEATER_UNITS)
            .std(1),

        // Switches and momentary controls.
        rule(A::SupplyAirAfterHeating, T::Switch).std(8),
        rule(A::DisplayButtonPress, T::Button).std_range(1, 19),
        rule(A::AlarmReset, T::Button).std(1),

        // HPS control board extension.
        rule(A::HpsMainSwitch, T::Switch).hps(1),
        rule(A::HpsSeasonMode, T::Select).hps(1),
        rule(A::HpsWaterHeaterSetpoint, T::WaterHeater).hps(1),
        rule(A::HpsHeatingSetpointMin, T::Number).hps(1),
        rule(A::HpsAlarmReset, T::Button).hps(1),
    ]
};

pub fn resolve(identity: &DeviceIdentity) -> ResolvedCapabilities {
    let mut resolved = BTreeMap::new();
    for rule in RULES {
        let bounds =
            if identity.variant.is_alternate() { &rule.alternate } else { &rule.standard };
        let Some(bounds) = bounds else { continue };
        if !rule.devices.matches(identity.hardware_type) {
            continue;
        }
        if !bounds.admits(identity.bus_version) {
            continue;
        }
        if let Some(gate) = rule.gate {
            let present = match gate {
                FeatureGate::Co2 => identity.co2_present,
            };
            if !present {
                continue;
            }
        }
        resolved.insert(rule.attribute, rule.category);
    }
    ResolvedCapabilities(resolved)
}

/// Attribute to category assignment for one discovered unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ResolvedCapabilities(BTreeMap<Attribute, TargetCategory>);

impl ResolvedCapabilities {
    pub fn supports(&self, attribute: Attribute) -> bool {
        self.0.contains_key(&attribute)
    }

    pub fn category(&self, attribute: Attribute) -> Option<TargetCategory> {
        self.0.get(&attribute).copied()
    }

    /// Attributes assigned to one category, in attribute order.
    pub fn assigned(&self, category: TargetCategory) -> impl Iterator<Item = Attribute> + '_ {
        self.0.iter().filter(move |(_, c)| **c == category).map(|(a, _)| *a)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Attribute, TargetCategory)> + '_ {
        self.0.iter().map(|(a, c)| (*a, *c))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Variant, device_type_name};
    use crate::registers::Attribute as A;

    fn identity(
        hardware_type: i16,
        bus_version: i16,
        variant: Variant,
        co2_present: bool,
    ) -> DeviceIdentity {
        DeviceIdentity {
            hardware_type,
            model: device_type_name(hardware_type).unwrap_or("unknown").to_string(),
            bus_version,
            software_version: "1.23".to_string(),
            hardware_version: None,
            variant,
            co2_present,
        }
    }

    #[test]
    fn resolution_is_pure() {
        let id = identity(44, 12, Variant::Standard, true);
        assert_eq!(resolve(&id), resolve(&id));
    }

    #[test]
    fn version_floor_excludes_newer_attributes() {
        let resolved = resolve(&identity(44, 9, Variant::Standard, false));
        assert!(resolved.supports(A::VentilationStep));
        assert!(resolved.supports(A::UserTemperatureSetpoint));
        assert!(!resolved.supports(A::AverageHumidity));
        assert!(!resolved.supports(A::VentilationState));
    }

    #[test]
    fn co2_gate_requires_probed_sensor() {
        let with_sensor = resolve(&identity(44, 12, Variant::Standard, true));
        assert_eq!(with_sensor.category(A::Co2SensorValue), Some(TargetCategory::Sensor));
        assert!(with_sensor.supports(A::Co2LowLimitSetpoint));

        let without_sensor = resolve(&identity(44, 12, Variant::Standard, false));
        assert!(!without_sensor.supports(A::Co2SensorValue));
        assert!(!without_sensor.supports(A::Co2LowLimitSetpoint));
    }

    #[test]
    fn excluded_versions_override_the_window() {
        for (bus_version, expected) in [(10, true), (11, false), (12, false), (13, true)] {
            let resolved = resolve(&identity(9, bus_version, Variant::Standard, false));
            assert_eq!(
                resolved.supports(A::AnodeState),
                expected,
                "anode state at bus version {bus_version}"
            );
        }
    }

    #[test]
    fn max_bus_version_is_inclusive() {
        let old = resolve(&identity(2, 19, Variant::Standard, false));
        assert!(old.supports(A::DisplayText1));
        assert!(old.supports(A::DisplayButtonPress));
        let new = resolve(&identity(2, 20, Variant::Standard, false));
        assert!(!new.supports(A::DisplayText1));
        assert!(!new.supports(A::DisplayButtonPress));
    }

    #[test]
    fn later_rules_overwrite_earlier_assignments() {
        let old = resolve(&identity(2, 7, Variant::Standard, false));
        assert_eq!(old.category(A::UserMenuState), Some(TargetCategory::Sensor));
        let new = resolve(&identity(2, 9, Variant::Standard, false));
        assert_eq!(new.category(A::UserMenuState), Some(TargetCategory::Select));
    }

    #[test]
    fn device_sets_restrict_attributes() {
        let comfort = resolve(&identity(13, 12, Variant::Standard, false));
        assert!(!comfort.supports(A::ElectricWaterHeaterSetpoint));
        assert!(!comfort.supports(A::CentralHeatSupplyCurve));

        let vp18 = resolve(&identity(10, 12, Variant::Standard, false));
        assert!(vp18.supports(A::ElectricWaterHeaterSetpoint));
        assert!(vp18.supports(A::HeaterRelay1State));
    }

    #[test]
    fn alternate_boards_evaluate_only_hps_bounds() {
        let air = resolve(&identity(44, 1, Variant::Air, true));
        assert!(air.supports(A::HpsMainSwitch));
        assert!(air.supports(A::HpsWaterHeaterSetpoint));
        assert!(air.supports(A::Co2SensorValue));
        // Standard-only rows never apply to an alternate board, regardless of
        // how new its bus version is.
        let geo = resolve(&identity(44, 25, Variant::Geo, false));
        assert!(!geo.supports(A::AverageHumidity));
        assert!(!geo.supports(A::DisplayText1));
        assert!(!geo.supports(A::Co2SensorValue));
    }

    #[test]
    fn standard_boards_never_see_hps_rows() {
        let standard = resolve(&identity(44, 12, Variant::Standard, true));
        assert!(!standard.supports(A::HpsMainSwitch));
        assert!(!standard.supports(A::HpsAlarmCount));
    }

    #[test]
    fn assigned_lists_category_members() {
        let resolved = resolve(&identity(44, 12, Variant::Standard, true));
        let climate: Vec<_> = resolved.assigned(TargetCategory::Climate).collect();
        assert!(climate.contains(&A::VentilationStep));
        assert!(climate.contains(&A::UserTemperatureSetpoint));
        assert!(!climate.contains(&A::Humidity));
    }

    #[test]
    fn every_exposed_attribute_has_a_rule() {
        let probes = [A::MachineType, A::AppVersionMinor, A::Co2SensorPresent];
        for attribute in Attribute::all() {
            let has_rule = RULES.iter().any(|r| r.attribute == *attribute);
            if probes.contains(attribute) {
                assert!(!has_rule, "{attribute} is a probe and should have no rule");
            } else {
                assert!(has_rule, "{attribute} has no capability rule");
            }
        }
    }

    #[test]
    fn writable_categories_map_to_writable_registers() {
        use TargetCategory as T;
        for rule in RULES {
            let descriptor = rule.attribute.descriptor();
            if matches!(rule.category, T::Select | T::Number | T::Switch | T::Button) {
                assert!(descriptor.mode.writable(), "{} is not writable", rule.attribute);
            }
            assert!(descriptor.mode.readable(), "{} is not readable", rule.attribute);
        }
    }
}
