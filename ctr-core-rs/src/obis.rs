//! OBIS codes and DLMS units
//!
//! An OBIS code (`A-B:C.D.E*F`) names a metrological quantity, e.g.
//! `1-0:1.8.0*255` is total active energy imported. In binary layouts it is
//! six bytes, one per group.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec::{hex_decode, hex_encode};
use crate::error::EncodingError;

/// Six-group OBIS identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Obis {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: u8,
}

impl Obis {
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Total active energy imported, `1-0:1.8.0*255`
    pub const ENERGY_IMPORT: Obis = Obis::new(1, 0, 1, 8, 0, 255);

    pub fn to_bytes(&self) -> [u8; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        match bytes {
            [a, b, c, d, e, f] => Ok(Self::new(*a, *b, *c, *d, *e, *f)),
            _ => Err(EncodingError::InvalidObis(hex_encode(bytes))),
        }
    }

    /// Six bytes as lowercase hex (`0100010800ff`)
    pub fn to_hex(&self) -> String {
        hex_encode(&self.to_bytes())
    }

    /// Parse exactly twelve hex digits
    pub fn from_hex(text: &str) -> Result<Self, EncodingError> {
        if text.trim().len() != 12 {
            return Err(EncodingError::InvalidObis(text.to_string()));
        }
        let bytes = hex_decode(text).map_err(|_| EncodingError::InvalidObis(text.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Accept either the dotted form or twelve hex digits
    pub fn parse_any(text: &str) -> Result<Self, EncodingError> {
        text.parse().or_else(|_| Self::from_hex(text))
    }
}

impl FromStr for Obis {
    type Err = EncodingError;

    /// Parse `A-B:C.D.E*F`. `F` defaults to 255 when the `*F` suffix is
    /// missing; lowercase `a-b` style medium letters are not accepted.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || EncodingError::InvalidObis(text.to_string());
        let trimmed = text.trim();

        let (ab, rest) = trimmed.split_once(':').ok_or_else(invalid)?;
        let (a, b) = ab.split_once('-').ok_or_else(invalid)?;
        let (cde, f) = match rest.split_once('*') {
            Some((cde, f)) => (cde, Some(f)),
            None => (rest, None),
        };
        let mut groups = cde.split('.');
        let c = groups.next().ok_or_else(invalid)?;
        let d = groups.next().ok_or_else(invalid)?;
        let e = groups.next().ok_or_else(invalid)?;
        if groups.next().is_some() {
            return Err(invalid());
        }

        let byte = |part: &str| -> Result<u8, EncodingError> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<u8>().map_err(|_| invalid())
        };

        Ok(Obis {
            a: byte(a)?,
            b: byte(b)?,
            c: byte(c)?,
            d: byte(d)?,
            e: byte(e)?,
            f: match f {
                Some(f) => byte(f)?,
                None => 255,
            },
        })
    }
}

impl fmt::Display for Obis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}:{}.{}.{}*{}", self.a, self.b, self.c, self.d, self.e, self.f)
    }
}

impl Serialize for Obis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Obis {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Obis::parse_any(&text).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// DLMS units
// ============================================================================

/// DLMS/COSEM unit codes used by the binary layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DlmsUnit {
    Second,
    Watt,
    VoltAmpere,
    Var,
    WattHour,
    VoltAmpereHour,
    VarHour,
    Ampere,
    Volt,
    Hertz,
    Ohm,
    Count,
}

impl DlmsUnit {
    pub fn code(&self) -> u8 {
        match self {
            DlmsUnit::Second => 7,
            DlmsUnit::Watt => 27,
            DlmsUnit::VoltAmpere => 28,
            DlmsUnit::Var => 29,
            DlmsUnit::WattHour => 30,
            DlmsUnit::VoltAmpereHour => 31,
            DlmsUnit::VarHour => 32,
            DlmsUnit::Ampere => 33,
            DlmsUnit::Volt => 35,
            DlmsUnit::Hertz => 44,
            DlmsUnit::Ohm => 45,
            DlmsUnit::Count => 255,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            7 => DlmsUnit::Second,
            27 => DlmsUnit::Watt,
            28 => DlmsUnit::VoltAmpere,
            29 => DlmsUnit::Var,
            30 => DlmsUnit::WattHour,
            31 => DlmsUnit::VoltAmpereHour,
            32 => DlmsUnit::VarHour,
            33 => DlmsUnit::Ampere,
            35 => DlmsUnit::Volt,
            44 => DlmsUnit::Hertz,
            45 => DlmsUnit::Ohm,
            255 => DlmsUnit::Count,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            DlmsUnit::Second => "s",
            DlmsUnit::Watt => "W",
            DlmsUnit::VoltAmpere => "VA",
            DlmsUnit::Var => "var",
            DlmsUnit::WattHour => "Wh",
            DlmsUnit::VoltAmpereHour => "VAh",
            DlmsUnit::VarHour => "varh",
            DlmsUnit::Ampere => "A",
            DlmsUnit::Volt => "V",
            DlmsUnit::Hertz => "Hz",
            DlmsUnit::Ohm => "Ohm",
            DlmsUnit::Count => "",
        }
    }

    /// Map a unit label to its DLMS code. Prefixed energy units (`kWh`)
    /// resolve to the base unit; the prefix belongs in the scale.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.trim() {
            "s" => DlmsUnit::Second,
            "W" | "kW" => DlmsUnit::Watt,
            "VA" => DlmsUnit::VoltAmpere,
            "var" => DlmsUnit::Var,
            "Wh" | "kWh" | "WATT_HOUR" | "KILO_WATT_HOUR" => DlmsUnit::WattHour,
            "VAh" => DlmsUnit::VoltAmpereHour,
            "varh" => DlmsUnit::VarHour,
            "A" => DlmsUnit::Ampere,
            "V" => DlmsUnit::Volt,
            "Hz" => DlmsUnit::Hertz,
            "Ohm" | "mOhm" | "uOhm" => DlmsUnit::Ohm,
            "" | "count" | "none" => DlmsUnit::Count,
            _ => return None,
        })
    }
}

impl fmt::Display for DlmsUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obis_round_trip() {
        let obis: Obis = "1-0:1.8.0*255".parse().unwrap();
        assert_eq!(obis, Obis::ENERGY_IMPORT);
        assert_eq!(obis.to_hex(), "0100010800ff");

        let back = Obis::from_hex("0100010800ff").unwrap();
        assert_eq!(back.to_string(), "1-0:1.8.0*255");
    }

    #[test]
    fn test_obis_default_f() {
        let obis: Obis = "1-0:2.8.0".parse().unwrap();
        assert_eq!(obis.f, 255);
        assert_eq!(obis.to_hex(), "0100020800ff");
    }

    #[test]
    fn test_obis_invalid() {
        for bad in ["", "1-0", "1-0:1.8", "1-0:1.8.0.0*255", "1-0:1.8.0*256", "x-0:1.8.0*255"] {
            assert!(matches!(bad.parse::<Obis>(), Err(EncodingError::InvalidObis(_))), "{bad}");
        }
        assert!(Obis::from_hex("0100010800").is_err());
        assert!(Obis::from_hex("0100010800zz").is_err());
    }

    #[test]
    fn test_obis_serde_accepts_both_forms() {
        let a: Obis = serde_json::from_str("\"1-0:1.8.0*255\"").unwrap();
        let b: Obis = serde_json::from_str("\"0100010800ff\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"0100010800ff\"");
    }

    #[test]
    fn test_dlms_units() {
        assert_eq!(DlmsUnit::WattHour.code(), 30);
        assert_eq!(DlmsUnit::from_code(30), Some(DlmsUnit::WattHour));
        assert_eq!(DlmsUnit::from_name("kWh"), Some(DlmsUnit::WattHour));
        assert_eq!(DlmsUnit::from_code(1), None);
        assert_eq!(DlmsUnit::from_name("furlong"), None);
    }
}
