use tracing::{debug, error, info};

use crate::capabilities::{self, ResolvedCapabilities, TargetCategory};
use crate::connection::{self, Transport};
use crate::registers::{Attribute, CodecError, Value, VersionStyle};

/// Hardware type codes the CTS602 controller family is known to report.
pub static DEVICE_TYPES: &[(i16, &str)] = &[
    (0, "TEST"),
    (1, "VPL 10"),
    (2, "VPL 15"),
    (3, "VPL 15c"),
    (4, "VPL 25"),
    (5, "VPL 28"),
    (6, "VPL 35"),
    (7, "VPL 45"),
    (8, "VPL 55"),
    (9, "VP 18 M2"),
    (10, "VP 18c"),
    (11, "VP 18ek"),
    (12, "VP 18cek"),
    (13, "COMFORT"),
    (19, "VGU 250"),
    (20, "VGU 250 EK"),
    (21, "VP 20c"),
    (22, "VP 20ek"),
    (23, "VP 20cek"),
    (26, "VPM 120"),
    (27, "VPM 240"),
    (28, "COMBI 302"),
    (31, "COMBI 300 N"),
    (32, "VPL 125"),
    (33, "VPL 250"),
    (34, "VP 18 Compact"),
    (38, "COMPACT S"),
    (44, "Compact P"),
    (45, "COMFORT N"),
];

/// The one hardware type whose units ship as either a standard, an AIR, or a
/// GEO configuration and need a secondary probe to tell apart.
const AIR_GEO_AMBIGUOUS_TYPE: i16 = 44;

pub fn device_type_name(code: i16) -> Option<&'static str> {
    DEVICE_TYPES.iter().find(|(c, _)| *c == code).map(|(_, name)| *name)
}

/// Sub-classification of the `Compact P` hardware type.
///
/// AIR and GEO units run the alternate HPS control board with its own
/// capability bounds and register extension block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Standard,
    Air,
    Geo,
}

impl Variant {
    pub fn is_alternate(&self) -> bool {
        !matches!(self, Variant::Standard)
    }

    fn model_suffix(&self) -> &'static str {
        match self {
            Variant::Standard => "",
            Variant::Air => " AIR",
            Variant::Geo => " GEO",
        }
    }
}

/// What the discovery handshake learned about the connected unit.
///
/// Built once during `setup()` and immutable afterwards; capability
/// resolution is a pure function of this value.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DeviceIdentity {
    pub hardware_type: i16,
    pub model: String,
    pub bus_version: i16,
    pub software_version: String,
    /// Controller board revision; only read when the unit exposes it.
    pub hardware_version: Option<u16>,
    pub variant: Variant,
    pub co2_present: bool,
}

impl DeviceIdentity {
    /// Byte/word order of the packed version string for this unit.
    pub fn version_style(&self) -> VersionStyle {
        if self.bus_version > 19 || self.variant.is_alternate() {
            VersionStyle::Dotted
        } else {
            VersionStyle::Packed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Discovering,
    Ready,
    Closed,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("transport failure")]
    Transport(#[from] connection::Error),
    #[error("device returned {got} registers where {want} were required")]
    MalformedResponse { want: u16, got: usize },
    #[error("hardware type {0} is not a known CTS602 unit")]
    UnsupportedDevice(i16),
    #[error("discovery read of `{0}` produced no data")]
    SetupFailed(Attribute),
    #[error("`{0}` is not supported by the connected unit")]
    NotSupported(Attribute),
    #[error("`{0}` does not accept writes")]
    NotWritable(Attribute),
    #[error("value `{value}` is outside the accepted domain of `{attribute}`")]
    Rejected { attribute: Attribute, value: Value },
    #[error("could not translate the register contents")]
    Codec(#[source] CodecError),
    #[error("the session is {actual:?} but this operation requires {wanted:?}")]
    State { wanted: SessionState, actual: SessionState },
}

fn map_codec(error: CodecError) -> Error {
    match error {
        CodecError::TooShort { want, got } => Error::MalformedResponse { want, got },
        other => Error::Codec(other),
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Host-assigned display name for the unit.
    pub name: String,
    /// The modbus device ID.
    pub unit_id: u8,
}

impl SessionConfig {
    pub fn new(name: impl Into<String>, unit_id: u8) -> Self {
        Self { name: name.into(), unit_id }
    }
}

/// One conversation with one CTS602 unit.
///
/// `setup()` runs the discovery handshake once; afterwards `read`/`write`
/// serve attribute access with local validation. The underlying channel is
/// half-duplex, so concurrent callers queue on the transport lock and are
/// never interleaved.
pub struct DeviceSession<C> {
    config: SessionConfig,
    transport: tokio::sync::Mutex<C>,
    state: std::sync::Mutex<SessionState>,
    identity: Option<DeviceIdentity>,
    capabilities: ResolvedCapabilities,
}

impl<C: Transport> DeviceSession<C> {
    pub fn new(config: SessionConfig, transport: C) -> Self {
        Self {
            config,
            transport: tokio::sync::Mutex::new(transport),
            state: std::sync::Mutex::new(SessionState::Uninitialized),
            identity: None,
            capabilities: ResolvedCapabilities::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    pub fn device_type(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.model.as_str())
    }

    pub fn software_version(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.software_version.as_str())
    }

    pub fn hardware_version(&self) -> Option<u16> {
        self.identity.as_ref().and_then(|i| i.hardware_version)
    }

    pub fn capabilities(&self) -> &ResolvedCapabilities {
        &self.capabilities
    }

    /// Attributes resolved into one target category, for platform setup.
    pub fn assigned(&self, category: TargetCategory) -> Vec<Attribute> {
        self.capabilities.assigned(category).collect()
    }

    fn ready(&self) -> Result<&DeviceIdentity, Error> {
        let actual = self.state();
        let state_error = Error::State { wanted: SessionState::Ready, actual };
        if actual != SessionState::Ready {
            return Err(state_error);
        }
        self.identity.as_ref().ok_or(state_error)
    }

    /// A transport-level failure poisons the session; the capability map and
    /// identity may no longer match whatever reconnects on the other side.
    fn note_transport_error(&self, error: &connection::Error) {
        if !matches!(error, connection::Error::Exception(_)) {
            self.set_state(SessionState::Closed);
        }
    }

    async fn probe(transport: &mut C, unit_id: u8, attribute: Attribute) -> Result<Vec<u16>, Error> {
        let descriptor = attribute.descriptor();
        let words = transport
            .read_registers(unit_id, descriptor.bank, descriptor.address, descriptor.count)
            .await?;
        if words.len() < usize::from(descriptor.count) {
            error!(message = "discovery read returned no data", attribute = %attribute);
            return Err(Error::SetupFailed(attribute));
        }
        Ok(words)
    }

    /// Run the discovery handshake and resolve the capability map.
    ///
    /// The probe chain is strictly sequential: each step decides whether the
    /// following ones run at all.
    pub async fn setup(&mut self) -> Result<(), Error> {
        let actual = self.state();
        if actual != SessionState::Uninitialized {
            return Err(Error::State { wanted: SessionState::Uninitialized, actual });
        }
        self.set_state(SessionState::Discovering);
        match self.discover().await {
            Ok(()) => {
                self.set_state(SessionState::Ready);
                Ok(())
            }
            Err(error) => {
                // The session stays in `Discovering`; construct a fresh one
                // to retry.
                Err(error)
            }
        }
    }

    async fn discover(&mut self) -> Result<(), Error> {
        let unit_id = self.config.unit_id;
        let transport = self.transport.get_mut();
        transport.connect().await?;
        debug!(message = "transport connected, probing identity", unit_id);

        let words = Self::probe(transport, unit_id, Attribute::MachineType).await?;
        let hardware_type = words[0] as i16;
        let Some(type_name) = device_type_name(hardware_type) else {
            error!(message = "hardware type not supported", hardware_type);
            return Err(Error::UnsupportedDevice(hardware_type));
        };
        debug!(message = "device type discovered", hardware_type, type_name);

        let words = Self::probe(transport, unit_id, Attribute::BusVersion).await?;
        let bus_version = words[0] as i16;
        debug!(message = "bus version discovered", bus_version);

        let variant = if hardware_type == AIR_GEO_AMBIGUOUS_TYPE {
            let words = Self::probe(transport, unit_id, Attribute::AppVersionMinor).await?;
            let minor = Attribute::AppVersionMinor
                .descriptor()
                .decode(&words, VersionStyle::Dotted)
                .map_err(map_codec)?;
            match minor {
                Value::Text(minor) if minor == "1" => Variant::Air,
                Value::Text(minor) if minor == "2" => Variant::Geo,
                _ => Variant::Standard,
            }
        } else {
            Variant::Standard
        };
        debug!(message = "variant discovered", ?variant);

        let style = if bus_version > 19 || variant.is_alternate() {
            VersionStyle::Dotted
        } else {
            VersionStyle::Packed
        };
        let words = Self::probe(transport, unit_id, Attribute::ControllerSoftwareVersion).await?;
        let software = Attribute::ControllerSoftwareVersion
            .descriptor()
            .decode(&words, style)
            .map_err(map_codec)?;
        let Value::Text(software_version) = software else {
            return Err(Error::SetupFailed(Attribute::ControllerSoftwareVersion));
        };

        let co2_present = if bus_version >= 10 || variant.is_alternate() {
            let words = Self::probe(transport, unit_id, Attribute::Co2SensorPresent).await?;
            words[0] != 0
        } else {
            false
        };

        let mut identity = DeviceIdentity {
            hardware_type,
            model: format!("{type_name}{}", variant.model_suffix()),
            bus_version,
            software_version,
            hardware_version: None,
            variant,
            co2_present,
        };
        let capabilities = capabilities::resolve(&identity);
        info!(
            message = "capabilities resolved",
            model = %identity.model,
            software = %identity.software_version,
            attributes = capabilities.len(),
        );

        if capabilities.supports(Attribute::ControllerHardwareVersion) {
            let words =
                Self::probe(transport, unit_id, Attribute::ControllerHardwareVersion).await?;
            identity.hardware_version = Some(words[0]);
        }

        self.identity = Some(identity);
        self.capabilities = capabilities;
        Ok(())
    }

    /// Read one attribute. Attributes absent from the resolved capability map
    /// answer `NotSupported` without touching the transport.
    pub async fn read(&self, attribute: Attribute) -> Result<Value, Error> {
        let identity = self.ready()?;
        if !self.capabilities.supports(attribute) {
            return Err(Error::NotSupported(attribute));
        }
        let descriptor = attribute.descriptor();
        let words = {
            let mut transport = self.transport.lock().await;
            transport
                .read_registers(
                    self.config.unit_id,
                    descriptor.bank,
                    descriptor.address,
                    descriptor.count,
                )
                .await
        };
        let words = words.map_err(|error| {
            self.note_transport_error(&error);
            Error::Transport(error)
        })?;
        descriptor.decode(&words, identity.version_style()).map_err(map_codec)
    }

    /// Write one attribute, validating against its declared domain before any
    /// transport traffic. Auto-clearing controls are followed by an
    /// unconditional write of 0.
    pub async fn write(&self, attribute: Attribute, value: Value) -> Result<(), Error> {
        self.ready()?;
        if !self.capabilities.supports(attribute) {
            return Err(Error::NotSupported(attribute));
        }
        let descriptor = attribute.descriptor();
        if !descriptor.mode.writable() {
            return Err(Error::NotWritable(attribute));
        }
        if !descriptor.accepts(&value) {
            debug!(message = "write rejected locally", attribute = %attribute, value = %value);
            return Err(Error::Rejected { attribute, value });
        }
        let words = descriptor.encode(&value).map_err(map_codec)?;
        let mut transport = self.transport.lock().await;
        let result = transport.write_registers(self.config.unit_id, descriptor.address, words).await;
        if let Err(error) = result {
            self.note_transport_error(&error);
            return Err(Error::Transport(error));
        }
        if descriptor.auto_clear {
            let result =
                transport.write_registers(self.config.unit_id, descriptor.address, vec![0]).await;
            if let Err(error) = result {
                self.note_transport_error(&error);
                return Err(Error::Transport(error));
            }
        }
        Ok(())
    }

    /// Tear the session down. `Closed` is terminal; construct a fresh session
    /// to talk to the unit again.
    pub async fn close(mut self) -> Result<(), Error> {
        self.set_state(SessionState::Closed);
        self.transport.get_mut().close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::Bank;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeInner {
        input: BTreeMap<u16, u16>,
        holding: BTreeMap<u16, u16>,
        writes: Vec<(u16, Vec<u16>)>,
        reads: usize,
        connected: bool,
        /// Addresses that answer with an empty register list.
        short_reads: Vec<(Bank, u16)>,
    }

    #[derive(Default, Clone)]
    struct FakeDevice(Arc<Mutex<FakeInner>>);

    impl FakeDevice {
        fn set(&self, bank: Bank, address: u16, value: u16) {
            let mut inner = self.0.lock().unwrap();
            match bank {
                Bank::Input => inner.input.insert(address, value),
                Bank::Holding => inner.holding.insert(address, value),
            };
        }

        fn short_read(&self, bank: Bank, address: u16) {
            self.0.lock().unwrap().short_reads.push((bank, address));
        }

        fn reads(&self) -> usize {
            self.0.lock().unwrap().reads
        }

        fn writes(&self) -> Vec<(u16, Vec<u16>)> {
            self.0.lock().unwrap().writes.clone()
        }
    }

    impl Transport for FakeDevice {
        async fn connect(&mut self) -> Result<(), connection::Error> {
            self.0.lock().unwrap().connected = true;
            Ok(())
        }

        async fn read_registers(
            &mut self,
            _unit_id: u8,
            bank: Bank,
            address: u16,
            count: u16,
        ) -> Result<Vec<u16>, connection::Error> {
            let mut inner = self.0.lock().unwrap();
            assert!(inner.connected, "read before connect");
            inner.reads += 1;
            if inner.short_reads.contains(&(bank, address)) {
                return Ok(Vec::new());
            }
            let registers = match bank {
                Bank::Input => &inner.input,
                Bank::Holding => &inner.holding,
            };
            Ok((address..address + count).map(|a| registers.get(&a).copied().unwrap_or(0)).collect())
        }

        async fn write_registers(
            &mut self,
            _unit_id: u8,
            address: u16,
            values: Vec<u16>,
        ) -> Result<(), connection::Error> {
            let mut inner = self.0.lock().unwrap();
            assert!(inner.connected, "write before connect");
            for (offset, value) in values.iter().enumerate() {
                inner.holding.insert(address + offset as u16, *value);
            }
            inner.writes.push((address, values));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), connection::Error> {
            self.0.lock().unwrap().connected = false;
            Ok(())
        }
    }

    /// A Compact P on a standard board, bus version 12, with a CO2 sensor.
    fn compact_p() -> FakeDevice {
        let fake = FakeDevice::default();
        fake.set(Bank::Holding, 1000, 44);
        fake.set(Bank::Input, 0, 12);
        // "123456" in the packed low-byte-first form.
        fake.set(Bank::Input, 1, 0x3231);
        fake.set(Bank::Input, 2, 0x3433);
        fake.set(Bank::Input, 3, 0x3635);
        fake.set(Bank::Input, 5, 164);
        fake.set(Bank::Input, 3003, 1);
        fake
    }

    async fn ready_session(fake: &FakeDevice) -> DeviceSession<FakeDevice> {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let config = SessionConfig::new("upstairs", 30);
        let mut session = DeviceSession::new(config, fake.clone());
        session.setup().await.unwrap();
        session
    }

    #[tokio::test]
    async fn setup_discovers_identity() {
        let fake = compact_p();
        let session = ready_session(&fake).await;
        assert_eq!(session.state(), SessionState::Ready);
        let identity = session.identity().unwrap();
        assert_eq!(identity.hardware_type, 44);
        assert_eq!(identity.bus_version, 12);
        assert_eq!(identity.model, "Compact P");
        assert_eq!(identity.variant, Variant::Standard);
        assert!(identity.co2_present);
        // Packed version form on a bus 12 unit.
        assert_eq!(identity.software_version, "123456");
        // The hardware revision read is gated on its own capability.
        assert_eq!(session.hardware_version(), Some(164));
        assert_eq!(session.name(), "upstairs");
    }

    #[tokio::test]
    async fn setup_rejects_unknown_hardware() {
        let fake = compact_p();
        fake.set(Bank::Holding, 1000, 99);
        let mut session = DeviceSession::new(SessionConfig::new("unit", 30), fake.clone());
        let error = session.setup().await.unwrap_err();
        assert!(matches!(error, Error::UnsupportedDevice(99)));
        assert_ne!(session.state(), SessionState::Ready);
        let read = session.read(Attribute::VentilationStep).await;
        assert!(matches!(read, Err(Error::State { .. })));
    }

    #[tokio::test]
    async fn setup_fails_on_empty_identity_read() {
        let fake = compact_p();
        fake.short_read(Bank::Input, 0);
        let mut session = DeviceSession::new(SessionConfig::new("unit", 30), fake.clone());
        let error = session.setup().await.unwrap_err();
        assert!(matches!(error, Error::SetupFailed(Attribute::BusVersion)));
    }

    #[tokio::test]
    async fn air_variant_is_probed_for_compact_p() {
        let fake = compact_p();
        fake.set(Bank::Input, 0, 5);
        // Minor app version " 1" marks the AIR configuration.
        fake.set(Bank::Input, 2, 0x3120);
        let session = ready_session(&fake).await;
        let identity = session.identity().unwrap();
        assert_eq!(identity.variant, Variant::Air);
        assert_eq!(identity.model, "Compact P AIR");
        assert_eq!(identity.version_style(), VersionStyle::Dotted);
        // Alternate boards resolve through the HPS bounds.
        assert!(session.capabilities().supports(Attribute::HpsMainSwitch));
        assert!(!session.capabilities().supports(Attribute::AverageHumidity));
    }

    #[tokio::test]
    async fn variant_probe_is_skipped_for_other_types() {
        let fake = compact_p();
        fake.set(Bank::Holding, 1000, 10);
        // Poison the probe register; a VP 18c must never read it.
        fake.set(Bank::Input, 2, 0x3120);
        let session = ready_session(&fake).await;
        assert_eq!(session.identity().unwrap().variant, Variant::Standard);
        assert_eq!(session.device_type(), Some("VP 18c"));
    }

    #[tokio::test]
    async fn unsupported_attribute_reads_make_no_transport_calls() {
        let fake = compact_p();
        fake.set(Bank::Input, 0, 9);
        let session = ready_session(&fake).await;
        let reads_after_setup = fake.reads();
        // average_humidity wants bus version 10, this unit reports 9.
        let result = session.read(Attribute::AverageHumidity).await;
        assert!(matches!(result, Err(Error::NotSupported(Attribute::AverageHumidity))));
        assert_eq!(fake.reads(), reads_after_setup);
    }

    #[tokio::test]
    async fn out_of_domain_writes_are_rejected_locally() {
        let fake = compact_p();
        let session = ready_session(&fake).await;
        let result = session.write(Attribute::VentilationStep, Value::U16(7)).await;
        assert!(matches!(
            result,
            Err(Error::Rejected { attribute: Attribute::VentilationStep, .. })
        ));
        assert!(fake.writes().is_empty());
    }

    #[tokio::test]
    async fn writes_encode_scaled_values() {
        let fake = compact_p();
        let session = ready_session(&fake).await;
        session.write(Attribute::UserTemperatureSetpoint, Value::from_celsius(21.5)).await.unwrap();
        assert_eq!(fake.writes(), vec![(1004, vec![2150])]);
    }

    #[tokio::test]
    async fn zero_disables_water_heater_setpoint() {
        let fake = compact_p();
        let session = ready_session(&fake).await;
        session.write(Attribute::ElectricWaterHeaterSetpoint, Value::Celsius(0)).await.unwrap();
        session.write(Attribute::ElectricWaterHeaterSetpoint, Value::from_celsius(45.0)).await.unwrap();
        let rejected = session.write(Attribute::ElectricWaterHeaterSetpoint, Value::from_celsius(3.0)).await;
        assert!(matches!(rejected, Err(Error::Rejected { .. })));
        assert_eq!(fake.writes(), vec![(1700, vec![0]), (1700, vec![4500])]);
    }

    #[tokio::test]
    async fn momentary_controls_write_then_clear() {
        let fake = compact_p();
        let session = ready_session(&fake).await;
        session.write(Attribute::DisplayButtonPress, Value::U16(3)).await.unwrap();
        assert_eq!(fake.writes(), vec![(2000, vec![3]), (2000, vec![0])]);
    }

    #[tokio::test]
    async fn read_only_attributes_reject_writes() {
        let fake = compact_p();
        let session = ready_session(&fake).await;
        let result = session.read(Attribute::T8OutdoorTemperature).await;
        assert!(result.is_ok());
        let write = session.write(Attribute::T8OutdoorTemperature, Value::Celsius(0)).await;
        assert!(matches!(write, Err(Error::NotWritable(_))));
    }

    #[tokio::test]
    async fn reads_decode_through_the_catalog() {
        let fake = compact_p();
        fake.set(Bank::Input, 208, 0xF830);
        fake.set(Bank::Input, 400, 0xFFFF);
        let session = ready_session(&fake).await;
        let outdoor = session.read(Attribute::T8OutdoorTemperature).await.unwrap();
        assert_eq!(outdoor, Value::Celsius(-2000));
        let alarms = session.read(Attribute::AlarmCount).await.unwrap();
        assert_eq!(alarms, Value::U16(3));
    }

    #[tokio::test]
    async fn short_responses_surface_without_poisoning_the_session() {
        let fake = compact_p();
        fake.short_read(Bank::Input, 221);
        let session = ready_session(&fake).await;
        let result = session.read(Attribute::Humidity).await;
        assert!(matches!(result, Err(Error::MalformedResponse { want: 1, got: 0 })));
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.read(Attribute::T8OutdoorTemperature).await.is_ok());
    }

    #[tokio::test]
    async fn setup_runs_once_per_session() {
        let fake = compact_p();
        let mut session = DeviceSession::new(SessionConfig::new("unit", 30), fake.clone());
        session.setup().await.unwrap();
        let again = session.setup().await;
        assert!(matches!(again, Err(Error::State { .. })));
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let fake = compact_p();
        let session = ready_session(&fake).await;
        session.close().await.unwrap();
        assert!(!fake.0.lock().unwrap().connected);
    }

    #[tokio::test]
    async fn assigned_mirrors_resolved_categories() {
        let fake = compact_p();
        let session = ready_session(&fake).await;
        let climate = session.assigned(TargetCategory::Climate);
        assert!(climate.contains(&Attribute::VentilationStep));
        let buttons = session.assigned(TargetCategory::Button);
        assert!(buttons.contains(&Attribute::AlarmReset));
        assert!(!buttons.contains(&Attribute::VentilationStep));
    }
}
