use jiff::civil;

/// The two disjoint CTS602 register address spaces.
///
/// Input registers are read-only telemetry, holding registers carry
/// configuration and control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bank {
    Input,
    Holding,
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Mode(u8);

impl Mode {
    pub const R: Self = Self(1 << 0);
    pub const W: Self = Self(1 << 1);
    pub const RW: Self = Self(Self::R.0 | Self::W.0);
    const R_: Self = Self::R;

    pub const fn readable(&self) -> bool {
        self.0 & Self::R.0 != 0
    }
    pub const fn writable(&self) -> bool {
        self.0 & Self::W.0 != 0
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.readable() { "R" } else { "-" })?;
        f.write_str(if self.writable() { "W" } else { "-" })?;
        Ok(())
    }
}

impl std::fmt::Debug for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl serde::Serialize for Mode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Scalar { scale: u16, signed: bool },
    Flag,
    Text,
    Version,
    Time,
}

impl DataType {
    // Convenience aliases for nicely tabulated `for_each_attribute` rows below.
    pub const U16: Self = Self::Scalar { scale: 1, signed: false };
    pub const I16: Self = Self::Scalar { scale: 1, signed: true };
    /// Hundredths of a degree Celsius.
    pub const CEL: Self = Self::Scalar { scale: 100, signed: true };
    /// Tenths of a degree Celsius (the HPS control board bank).
    pub const DEG: Self = Self::Scalar { scale: 10, signed: true };
    /// Hundredths of a percent.
    pub const PCT: Self = Self::Scalar { scale: 100, signed: false };
    const FLAG: Self = Self::Flag;
    const TEXT: Self = Self::Text;
    const VERS: Self = Self::Version;
    const TIME: Self = Self::Time;
}

/// Byte and word order of the packed software-version string.
///
/// Units with bus version > 19, and every AIR/GEO/HPS board, put the high byte
/// of each register first and join registers with a separator ("XX.YY.ZZ").
/// Older units put the low byte first with no separator ("XXYY"). The flip is
/// a protocol constant observed on real firmware, not an encoding bug to fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStyle {
    Dotted,
    Packed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U16(u16),
    I16(i16),
    /// Contains a value multiplied by 100.
    Celsius(i16),
    /// Contains a value multiplied by 10.
    Deci(i16),
    /// Contains a value multiplied by 100.
    Percent(u16),
    Bool(bool),
    Text(String),
    Time(civil::DateTime),
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::U16(n) => serializer.serialize_u16(*n),
            Value::I16(n) => serializer.serialize_i16(*n),
            Value::Celsius(n) => serializer.serialize_f32(f32::from(*n) / 100.0),
            Value::Deci(n) => serializer.serialize_f32(f32::from(*n) / 10.0),
            Value::Percent(n) => serializer.serialize_f32(f32::from(*n) / 100.0),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Text(t) => serializer.serialize_str(t),
            Value::Time(t) => serializer.serialize_str(&t.to_string()),
        }
    }
}

impl Value {
    pub fn from_celsius(degrees: f32) -> Self {
        Value::Celsius((degrees * 100.0).round() as i16)
    }

    pub fn from_tenths(degrees: f32) -> Self {
        Value::Deci((degrees * 10.0).round() as i16)
    }

    /// The raw register word for single-word kinds.
    pub fn raw_word(&self) -> Option<u16> {
        match self {
            Value::U16(v) | Value::Percent(v) => Some(*v),
            Value::I16(v) | Value::Celsius(v) | Value::Deci(v) => Some(*v as u16),
            Value::Bool(b) => Some(u16::from(*b)),
            Value::Text(_) | Value::Time(_) => None,
        }
    }

    /// The raw value reinterpreted with its sign, for domain checks.
    pub fn raw_magnitude(&self) -> Option<i32> {
        match self {
            Value::U16(v) | Value::Percent(v) => Some(i32::from(*v)),
            Value::I16(v) | Value::Celsius(v) | Value::Deci(v) => Some(i32::from(*v)),
            Value::Bool(b) => Some(i32::from(*b)),
            Value::Text(_) | Value::Time(_) => None,
        }
    }

    /// Scaled numeric reading, if the value is numeric at all.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::U16(v) => Some(f32::from(*v)),
            Value::I16(v) => Some(f32::from(*v)),
            Value::Celsius(v) => Some(f32::from(*v) / 100.0),
            Value::Deci(v) => Some(f32::from(*v) / 10.0),
            Value::Percent(v) => Some(f32::from(*v) / 100.0),
            Value::Bool(b) => Some(f32::from(u8::from(*b))),
            Value::Text(_) | Value::Time(_) => None,
        }
    }

    /// Interpret an enumeration-coded register through a typed enum.
    pub fn as_enum<T: num_traits::FromPrimitive>(&self) -> Option<T> {
        T::from_u16(self.raw_word()?)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::U16(n) => f.write_fmt(format_args!("{}", n)),
            Value::I16(n) => f.write_fmt(format_args!("{}", n)),
            Value::Celsius(n) => f.write_fmt(format_args!("{}", f32::from(*n) / 100.0)),
            Value::Deci(n) => f.write_fmt(format_args!("{}", f32::from(*n) / 10.0)),
            Value::Percent(n) => f.write_fmt(format_args!("{}", f32::from(*n) / 100.0)),
            Value::Bool(b) => f.write_fmt(format_args!("{}", b)),
            Value::Text(t) => f.write_str(t),
            Value::Time(t) => f.write_fmt(format_args!("{}", t)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("device returned {got} registers where {want} were required")]
    TooShort { want: u16, got: usize },
    #[error("value does not match the register data type")]
    Mismatch,
    #[error("register clock fields do not form a valid calendar timestamp")]
    InvalidTimestamp,
}

/// Wire representation of one logical attribute.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RegisterDescriptor {
    pub bank: Bank,
    pub address: u16,
    pub count: u16,
    pub data_type: DataType,
    pub mode: Mode,
    /// Bit range retained from the raw word; attribute-specific, e.g. the two
    /// alarm counter bits or the seven alarm code bits.
    pub mask: Option<u16>,
    /// Inclusive write domain in raw register units.
    pub minimum: Option<i32>,
    pub maximum: Option<i32>,
    /// Enumerated write domain in raw register units, for non-contiguous sets.
    pub allowed: Option<&'static [u16]>,
    /// Zero is accepted outside [minimum, maximum] and disables the function.
    pub zero_disables: bool,
    /// Writes are momentary: the requested code is followed by an
    /// unconditional write of 0.
    pub auto_clear: bool,
}

fn scalar_value(raw: u16, scale: u16, signed: bool) -> Value {
    match (scale, signed) {
        (1, false) => Value::U16(raw),
        (1, true) => Value::I16(raw as i16),
        (100, true) => Value::Celsius(raw as i16),
        (10, true) => Value::Deci(raw as i16),
        (100, false) => Value::Percent(raw),
        (_, true) => Value::I16(raw as i16),
        (_, false) => Value::U16(raw),
    }
}

fn decode_text(words: &[u16]) -> String {
    let mut text = String::with_capacity(words.len() * 2);
    for word in words {
        for byte in [(word & 0x00FF) as u8, (word >> 8) as u8] {
            // The old HMI display charset maps 0xDF to the degree sign.
            text.push(if byte == 0xDF { '°' } else { char::from(byte) });
        }
    }
    text
}

fn decode_version(words: &[u16], style: VersionStyle) -> String {
    let mut version = String::new();
    match style {
        VersionStyle::Dotted => {
            for (index, word) in words.iter().enumerate() {
                if index > 0 {
                    version.push('.');
                }
                version.push(char::from((word >> 8) as u8));
                version.push(char::from((word & 0x00FF) as u8));
            }
        }
        VersionStyle::Packed => {
            for word in words {
                version.push(char::from((word & 0x00FF) as u8));
                version.push(char::from((word >> 8) as u8));
            }
        }
    }
    version.retain(|c| c != ' ');
    version
}

fn decode_time(words: &[u16]) -> Result<civil::DateTime, CodecError> {
    let [second, minute, hour, day, month, year] = words else {
        return Err(CodecError::Mismatch);
    };
    civil::DateTime::new(
        *year as i16,
        *month as i8,
        *day as i8,
        *hour as i8,
        *minute as i8,
        *second as i8,
        0,
    )
    .map_err(|_| CodecError::InvalidTimestamp)
}

impl RegisterDescriptor {
    pub fn decode(&self, words: &[u16], style: VersionStyle) -> Result<Value, CodecError> {
        if words.len() < usize::from(self.count) {
            return Err(CodecError::TooShort { want: self.count, got: words.len() });
        }
        let words = &words[..usize::from(self.count)];
        Ok(match self.data_type {
            DataType::Scalar { scale, signed } => {
                let raw = self.mask.map_or(words[0], |mask| words[0] & mask);
                scalar_value(raw, scale, signed)
            }
            DataType::Flag => Value::Bool(words[0] != 0),
            DataType::Text => Value::Text(decode_text(words)),
            DataType::Version => Value::Text(decode_version(words, style)),
            DataType::Time => Value::Time(decode_time(words)?),
        })
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u16>, CodecError> {
        match (self.data_type, value) {
            (DataType::Scalar { .. }, value) => {
                Ok(vec![value.raw_word().ok_or(CodecError::Mismatch)?])
            }
            (DataType::Flag, Value::Bool(b)) => Ok(vec![u16::from(*b)]),
            (DataType::Time, Value::Time(t)) => Ok(vec![
                t.second() as u16,
                t.minute() as u16,
                t.hour() as u16,
                t.day() as u16,
                t.month() as u16,
                t.year() as u16,
            ]),
            _ => Err(CodecError::Mismatch),
        }
    }

    /// Whether an encoded raw value lies within this attribute's write domain.
    pub fn accepts(&self, value: &Value) -> bool {
        let Some(raw) = value.raw_magnitude() else {
            // Multi-word kinds (the device clock) have no scalar domain.
            return matches!(self.data_type, DataType::Time) && matches!(value, Value::Time(_));
        };
        if let Some(allowed) = self.allowed {
            return allowed.iter().any(|a| i32::from(*a) == raw);
        }
        if self.zero_disables && raw == 0 {
            return true;
        }
        if self.minimum.is_some_and(|min| raw < min) {
            return false;
        }
        if self.maximum.is_some_and(|max| raw > max) {
            return false;
        }
        true
    }
}

macro_rules! optional {
    () => {
        None
    };
    ($($lit: tt)+) => {
        Some($($lit)*)
    };
}

macro_rules! or_false {
    () => {
        false
    };
    ($lit: literal) => {
        $lit
    };
}

macro_rules! for_each_attribute {
    ($m:ident) => {
        $m! {
            // Identity and versioning.
            BusVersion:             Input      0 / 1, U16,  R_;
            ControllerSoftwareVersion: Input   1 / 3, VERS, R_;
            AppVersionMinor:        Input      2 / 1, VERS, R_;
            ControllerHardwareVersion: Input   5 / 1, U16,  R_;
            MachineType:            Holding 1000 / 1, I16,  R_;

            // Climate control.
            RunState:               Holding 1001 / 1, FLAG, RW;
            OperationMode:          Holding 1002 / 1, U16,  RW, set = [1, 2, 3];
            VentilationStep:        Holding 1003 / 1, U16,  RW, min = 0, max = 4;
            UserTemperatureSetpoint: Holding 1004 / 1, CEL, RW, min = 500, max = 3000;
            UserHumiditySetpoint:   Holding 1912 / 1, U16,  RW, min = 15, max = 45;
            AirExchangeMode:        Holding 1100 / 1, U16,  RW, set = [0, 1, 2];
            ControlState:           Input   1002 / 1, U16,  R_;
            RoomMasterTemperature:  Input   1203 / 1, CEL,  R_;
            VentilationState:       Input   3102 / 1, U16,  R_;
            InletSpeedStep:         Input   1100 / 1, U16,  R_;

            // Temperature probes.
            T0ControllerTemperature: Input   200 / 1, CEL,  R_;
            T1IntakeTemperature:    Input    201 / 1, CEL,  R_;
            T2InletTemperature:     Input    202 / 1, CEL,  R_;
            T3ExhaustTemperature:   Input    203 / 1, CEL,  R_;
            T4OutletTemperature:    Input    204 / 1, CEL,  R_;
            T5CondenserTemperature: Input    205 / 1, CEL,  R_;
            T6EvaporatorTemperature: Input   206 / 1, CEL,  R_;
            T7InletAfterHeaterTemperature: Input 207 / 1, CEL, R_;
            T8OutdoorTemperature:   Input    208 / 1, CEL,  R_;
            T10ExternalTemperature: Input    210 / 1, CEL,  R_;
            T11ElectricWaterHeaterTemperature: Input 211 / 1, CEL, R_;
            T12CompressorWaterHeaterTemperature: Input 212 / 1, CEL, R_;
            T13ReturnTemperature:   Input    213 / 1, CEL,  R_;
            T14SupplyTemperature:   Input    214 / 1, CEL,  R_;
            T15RoomTemperature:     Input    215 / 1, CEL,  R_;
            T16SacrificialAnodeTemperature: Input 216 / 1, CEL, R_;

            // Air quality and fan telemetry.
            Humidity:               Input    221 / 1, PCT,  R_;
            Co2SensorValue:         Input    222 / 1, U16,  R_;
            Co2SensorPresent:       Input   3003 / 1, FLAG, R_;
            AverageHumidity:        Input   3100 / 1, PCT,  R_;
            SupplyFanLevel:         Input   1101 / 1, U16,  R_;
            ReturnFanLevel:         Input   1102 / 1, U16,  R_;
            ReturnFanSpeed:         Holding  200 / 1, PCT,  R_;
            SupplyFanSpeed:         Holding  201 / 1, PCT,  R_;
            DaysSinceAirFilterChange: Input 1103 / 1, U16,  R_;
            DaysToAirFilterChange:  Input   1104 / 1, U16,  R_;
            SummerState:            Input   1200 / 1, FLAG, R_;
            TimeInControlState:     Input   1003 / 1, U16,  R_;
            AirTempEffPct:          Input   1204 / 1, PCT,  R_;
            AfterHeatingElementCapacity: Input 3001 / 1, PCT, R_;
            AfterHeatingType:       Holding 4005 / 1, U16,  R_;
            AnodeState:             Input   1701 / 1, U16,  R_;

            // Alarms.
            AlarmCount:             Input    400 / 1, U16,  R_, mask = 0x03;
            Alarm1Code:             Input    401 / 1, U16,  R_, mask = 0x7F;
            Alarm1Date:             Input    402 / 1, U16,  R_;
            Alarm1Time:             Input    403 / 1, U16,  R_;
            Alarm2Code:             Input    404 / 1, U16,  R_, mask = 0x7F;
            Alarm2Date:             Input    405 / 1, U16,  R_;
            Alarm2Time:             Input    406 / 1, U16,  R_;
            Alarm3Code:             Input    407 / 1, U16,  R_, mask = 0x7F;
            Alarm3Date:             Input    408 / 1, U16,  R_;
            Alarm3Time:             Input    409 / 1, U16,  R_;

            // Old HMI mirror and device clock.
            DisplayLed1State:       Input   2000 / 1, FLAG, R_;
            DisplayLed2State:       Input   2001 / 1, FLAG, R_;
            DisplayText1:           Input   2002 / 4, TEXT, R_;
            DisplayText2:           Input   2007 / 4, TEXT, R_;
            Time:                   Holding  300 / 6, TIME, RW;

            // Relay and digital input state.
            CirculationPumpState:   Holding  104 / 1, FLAG, R_;
            HeaterRelay1State:      Holding  106 / 1, FLAG, R_;
            HeaterRelay2State:      Holding  107 / 1, FLAG, R_;
            HeaterRelay3State:      Holding  108 / 1, FLAG, R_;
            CompressorState:        Holding  109 / 1, FLAG, R_;
            UserFunction1State:     Input    100 / 1, FLAG, R_;
            SmokeAlarmState:        Input    103 / 1, FLAG, R_;
            DefrostState:           Input    112 / 1, FLAG, R_;
            UserFunction2State:     Input    113 / 1, FLAG, R_;
            BypassFlapState:        Input   3000 / 1, FLAG, R_;

            // Mode selections.
            CoolingModeVentilationStep: Holding 1101 / 1, U16, RW, set = [0, 2, 3, 4];
            CoolingSetpoint:        Holding 1200 / 1, U16,  RW, set = [0, 2, 3, 4, 5, 6, 7, 8];
            MinSupplyStep:          Holding 4015 / 1, U16,  RW, set = [0, 1, 2, 3, 4];
            MinReturnStep:          Holding 4016 / 1, U16,  RW, set = [1, 2, 3, 4];
            MaxReturnStep:          Holding 4017 / 1, U16,  RW, set = [3, 4];
            LowHumidityStep:        Holding 1910 / 1, U16,  RW, set = [0, 1, 2, 3, 4];
            HighHumidityStep:       Holding 1911 / 1, U16,  RW, set = [0, 2, 3, 4];
            Co2VentilationHighStep: Holding 1920 / 1, U16,  RW, set = [0, 2, 3, 4];
            AirQualityControlType:  Holding 4108 / 1, U16,  RW, set = [0, 1, 2];
            AirFilterAlarmInterval: Holding 1105 / 1, U16,  RW, set = [0, 1, 2, 3, 4, 5];
            LegionellaDay:          Holding 1705 / 1, U16,  RW, set = [0, 1, 2, 3, 4, 5, 6, 7];
            LowOutdoorTemperatureVentilationStep: Holding 4003 / 1, U16, RW, set = [0, 1, 2, 3];
            DefrostVentilationLevel: Holding 4020 / 1, U16, RW, set = [0, 1, 2];
            CentralHeatType:        Holding 1807 / 1, U16,  RW, set = [0, 1, 2, 3];
            CentralHeatSelect:      Holding 1801 / 1, U16,  RW, set = [0, 1, 2];
            AirHeatSelect:          Holding 1209 / 1, U16,  RW, set = [0, 1, 2, 3, 4];
            PreHeaterDefrostSelect: Holding 4111 / 1, U16,  RW, set = [0, 1];
            PreHeaterTempSet:       Holding 4112 / 1, U16,  RW, set = [0, 1, 2, 3, 4, 5];
            HmiLanguage:            Holding 2003 / 1, U16,  RW, set = [0, 1, 2, 3, 4, 5, 6, 7];
            CirculationPumpMode:    Holding 1806 / 1, U16,  RW, set = [0, 1];
            CompressorPriority:     Holding 1702 / 1, U16,  RW, set = [0, 1];
            UserMenuState:          Holding 2002 / 1, U16,  RW, set = [0, 1, 2];

            // Numeric configuration.
            SupplyPowerAtLevel1:    Holding 4100 / 1, I16,  RW, min = 20, max = 100;
            SupplyPowerAtLevel2:    Holding 4101 / 1, I16,  RW, min = 20, max = 100;
            SupplyPowerAtLevel3:    Holding 4102 / 1, I16,  RW, min = 20, max = 100;
            SupplyPowerAtLevel4:    Holding 4103 / 1, I16,  RW, min = 20, max = 100;
            ReturnPowerAtLevel1:    Holding 4104 / 1, I16,  RW, min = 20, max = 100;
            ReturnPowerAtLevel2:    Holding 4105 / 1, I16,  RW, min = 20, max = 100;
            ReturnPowerAtLevel3:    Holding 4106 / 1, I16,  RW, min = 20, max = 100;
            ReturnPowerAtLevel4:    Holding 4107 / 1, I16,  RW, min = 20, max = 100;
            FanStartupDelay:        Holding 4018 / 1, U16,  RW, min = 0, max = 240;
            MinimumDefrostTime:     Holding 4027 / 1, U16,  RW, min = 10, max = 120;
            MaximumOutletDefrostTime: Holding 4026 / 1, U16, RW, min = 5, max = 60;
            MaximumCompressorDefrostTime: Holding 4025 / 1, U16, RW, min = 2, max = 60;
            TimeBetweenDefrost:     Holding 4022 / 1, U16,  RW, min = 15, max = 720;
            SupplyHeaterDelay:      Holding 4006 / 1, U16,  RW, min = 0, max = 30;
            CentralHeatSupplyCurve: Holding 1805 / 1, U16,  RW, min = 1, max = 10;
            CompressorStopTime:     Holding 1503 / 1, U16,  RW, min = 0, max = 3600;
            Co2LowLimitSetpoint:    Holding 1921 / 1, U16,  RW, min = 400, max = 750;
            Co2HighLimitSetpoint:   Holding 1922 / 1, U16,  RW, min = 650, max = 2500;
            MaxHighHumidityVentTime: Holding 1913 / 1, U16, RW, min = 1, max = 180;
            SupplyHeatingPidTime:   Holding 1808 / 1, U16,  RW, min = 0, max = 25;
            LowTemperatureCurve:    Holding 1500 / 1, CEL,  RW, min = 1500, max = 4600;
            HighTemperatureCurve:   Holding 1501 / 1, CEL,  RW, min = 3900, max = 6000;
            LowTemperatureCompressorStartSetpoint: Holding 1502 / 1, CEL, RW, min = 0, max = 1500;
            ExternalHeatingOffset:  Holding 1800 / 1, CEL,  RW, min = 0, max = 1000;
            ChMinSupplyTemperature: Holding 1802 / 1, CEL,  RW, min = 500, max = 4000;
            ChMaxSupplyTemperature: Holding 1803 / 1, CEL,  RW, min = 0, max = 10000;
            CentralHeatSupplyCurveOffset: Holding 1804 / 1, CEL, RW, min = -1500, max = 1000;
            DefrostStartSetpoint:   Holding 4023 / 1, CEL,  RW, min = -1000, max = 0;
            DefrostStopSetpoint:    Holding 4024 / 1, CEL,  RW, min = 200, max = 1200;
            MinSupplyAirSummerSetpoint: Holding 1201 / 1, CEL, RW, min = 500, max = 5000;
            MinSupplyAirWinterSetpoint: Holding 1202 / 1, CEL, RW, min = 500, max = 5000;
            MaxSupplyAirSummerSetpoint: Holding 1203 / 1, CEL, RW, min = 500, max = 5000;
            MaxSupplyAirWinterSetpoint: Holding 1204 / 1, CEL, RW, min = 500, max = 5000;
            SummerStateChangeSetpoint: Holding 1205 / 1, CEL, RW, min = 500, max = 3000;
            LowOutdoorTemperatureSetpoint: Holding 4002 / 1, CEL, RW, min = -2000, max = 1000;
            LowRoomTemperatureSetpoint: Holding 4012 / 1, CEL, RW, min = 0, max = 2000;
            ScaldingProtectionSetpoint: Holding 1703 / 1, CEL, RW, min = 6000, max = 8000;
            ElectricWaterHeaterSetpoint: Holding 1700 / 1, CEL, RW, min = 500, max = 8500, zero_ok = true;
            CompressorWaterHeaterSetpoint: Holding 1701 / 1, CEL, RW, min = 500, max = 6000, zero_ok = true;

            // Switches and momentary controls.
            SupplyAirAfterHeating:  Holding 4013 / 1, FLAG, RW;
            DisplayButtonPress:     Holding 2000 / 1, U16,  RW, min = 0, max = 63, clears = true;
            AlarmReset:             Holding  400 / 1, U16,  RW, min = 0, max = 255, clears = true;

            // HPS control board extension.
            HpsMainSwitch:          Holding 5000 / 1, FLAG, RW;
            HpsSeasonMode:          Holding 5001 / 1, U16,  RW, set = [0, 1, 2];
            HpsWaterHeaterSetpoint: Holding 5002 / 1, DEG,  RW, min = 50, max = 700, zero_ok = true;
            HpsHeatingSetpointMin:  Holding 5003 / 1, DEG,  RW, min = 0, max = 700;
            HpsAlarmReset:          Holding 5004 / 1, U16,  RW, min = 0, max = 255, clears = true;
            HpsAlarmCount:          Input   3200 / 1, U16,  R_;
        }
    };
}

macro_rules! make_catalog {
    ($($name:ident: $bank:ident $addr:literal / $count:literal, $dt:ident, $mode:ident
        $(, min = $min:literal)? $(, max = $max:literal)?
        $(, set = [$($allow:literal),+])?
        $(, mask = $mask:literal)?
        $(, zero_ok = $zero:literal)?
        $(, clears = $clear:literal)?;)+) => {
        /// Every logical attribute the CTS602 family can expose.
        ///
        /// The snake_case rendering of each variant is the attribute key
        /// vocabulary shared with host applications.
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            strum::Display, strum::EnumString, strum::IntoStaticStr, strum::VariantArray,
            serde::Serialize,
        )]
        #[strum(serialize_all = "snake_case")]
        #[serde(rename_all = "snake_case")]
        pub enum Attribute { $($name),+ }

        pub static DESCRIPTORS: &[RegisterDescriptor] = &[
            $(RegisterDescriptor {
                bank: Bank::$bank,
                address: $addr,
                count: $count,
                data_type: DataType::$dt,
                mode: Mode::$mode,
                mask: optional!($($mask)?),
                minimum: optional!($($min)?),
                maximum: optional!($($max)?),
                allowed: optional!($(&[$($allow),+])?),
                zero_disables: or_false!($($zero)?),
                auto_clear: or_false!($($clear)?),
            }),+
        ];
    };
}

for_each_attribute!(make_catalog);

impl Attribute {
    pub fn all() -> &'static [Attribute] {
        <Self as strum::VariantArray>::VARIANTS
    }

    pub fn from_key(key: &str) -> Option<Attribute> {
        key.parse().ok()
    }

    pub fn key(self) -> &'static str {
        self.into()
    }

    pub fn descriptor(self) -> &'static RegisterDescriptor {
        &DESCRIPTORS[self as usize]
    }
}

/// Machine state reported in the `control_state` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_derive::FromPrimitive, strum::Display)]
pub enum ControlState {
    Off = 0,
    Shift,
    Stop,
    Start,
    Standby,
    VentilationStop,
    Ventilation,
    Heating,
    Cooling,
    HotWater,
    Legionella,
    CoolingAndHotWater,
    CentralHeating,
    Defrost,
    FrostSecure,
    Service,
    Alarm,
    HeatingAndHotWater,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, num_derive::FromPrimitive, strum::Display)]
pub enum OperationMode {
    Off = 0,
    Heat,
    Cool,
    Auto,
}

/// Reason for the currently selected ventilation rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_derive::FromPrimitive, strum::Display)]
pub enum VentilationState {
    Off = 0,
    Normal,
    LowHumidity,
    HighHumidity,
    HighCo2,
    LowRoomTemperature,
    LowOutdoorTemperature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, num_derive::FromPrimitive, strum::Display)]
pub enum AnodeState {
    Off = 0,
    Ok,
    Service,
}
