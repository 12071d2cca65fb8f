//! Test fixtures: fresh keys, signatures and a one-meter resolver

use chrono::{DateTime, Duration, FixedOffset};
use ctr_core::{
    codec, Authorization, ChargingSession, Curve, EnergyMeter, Measurement, MeasurementValue,
    Obis, PublicKeyInfo, SignatureValue,
};
use openssl::bn::BigNumContext;
use openssl::ec::{EcKey, PointConversionForm};
use openssl::ecdsa::EcdsaSig;
use openssl::pkey::Private;

use crate::vendors::{MeterResolver, SessionFormat};

pub struct TestKey {
    pub curve: Curve,
    pub key: EcKey<Private>,
}

impl TestKey {
    pub fn new(curve: Curve) -> Self {
        let key = EcKey::generate(&curve.group().unwrap()).unwrap();
        Self { curve, key }
    }

    pub fn point(&self) -> Vec<u8> {
        let mut ctx = BigNumContext::new().unwrap();
        self.key
            .public_key()
            .to_bytes(self.key.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)
            .unwrap()
    }

    pub fn der(&self) -> Vec<u8> {
        self.key.public_key_to_der().unwrap()
    }

    pub fn info_raw(&self) -> PublicKeyInfo {
        PublicKeyInfo {
            curve: Some(self.curve.name().to_string()),
            format: Some("raw".into()),
            encoding: Some("hex".into()),
            value: codec::hex_encode(&self.point()),
            ..Default::default()
        }
    }

    pub fn info_der(&self) -> PublicKeyInfo {
        PublicKeyInfo {
            curve: Some(self.curve.name().to_string()),
            format: Some("DER".into()),
            encoding: Some("hex".into()),
            value: codec::hex_encode(&self.der()),
            ..Default::default()
        }
    }

    pub fn sign(&self, digest: &[u8]) -> EcdsaSig {
        EcdsaSig::sign(digest, &self.key).unwrap()
    }

    /// Fixed-width r‖s
    pub fn sign_concatenated(&self, digest: &[u8]) -> Vec<u8> {
        let sig = self.sign(digest);
        let width = self.curve.field_size() as i32;
        let mut out = sig.r().to_vec_padded(width).unwrap();
        out.extend(sig.s().to_vec_padded(width).unwrap());
        out
    }
}

pub fn sign_rs(key: &TestKey, digest: &[u8]) -> SignatureValue {
    let sig = key.sign(digest);
    SignatureValue {
        format: Some("rs".into()),
        r: Some(codec::hex_encode(&sig.r().to_vec())),
        s: Some(codec::hex_encode(&sig.s().to_vec())),
        ..Default::default()
    }
}

pub fn sign_der(key: &TestKey, digest: &[u8]) -> SignatureValue {
    SignatureValue {
        format: Some("DER".into()),
        value: Some(codec::hex_encode(&key.sign(digest).to_der().unwrap())),
        ..Default::default()
    }
}

pub struct SingleMeter {
    pub meter: EnergyMeter,
    pub keys: Vec<PublicKeyInfo>,
}

impl MeterResolver for SingleMeter {
    fn resolve(&self, _: &ChargingSession, _: &Measurement) -> Option<&EnergyMeter> {
        Some(&self.meter)
    }

    fn record_keys(&self) -> &[PublicKeyInfo] {
        &self.keys
    }
}

pub fn ts(text: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(text).unwrap()
}

/// Session with one energy measurement, values one minute apart
pub fn session_with_meter(
    format: SessionFormat,
    meter_id: &str,
    values: &[&str],
    scale: i8,
) -> (ChargingSession, SingleMeter) {
    let start = ts("2019-06-26T10:57:44+02:00");
    let values = values
        .iter()
        .enumerate()
        .map(|(i, v)| MeasurementValue {
            timestamp: Some(start + Duration::minutes(i as i64)),
            value: v.parse().unwrap(),
            info_status: Some("08".into()),
            seconds_index: Some(1000 + 60 * i as u64),
            pagination_id: Some(format!("{:08x}", i + 1)),
            log_book_index: Some("0001".into()),
            ..Default::default()
        })
        .collect();

    let session = ChargingSession {
        id: Some("session-1".into()),
        context: Some(format.context()),
        evse_id: Some("DE*GEF*E1".into()),
        meter_id: Some(meter_id.into()),
        authorization_start: Some(Authorization {
            id: "04123456".into(),
            auth_type: Some("RFID".into()),
            timestamp: Some(ts("2019-06-26T10:50:00+02:00")),
        }),
        measurements: vec![Measurement {
            energy_meter_id: Some(meter_id.into()),
            name: Some("ENERGY_TOTAL".into()),
            obis: Some(Obis::ENERGY_IMPORT),
            unit: Some("Wh".into()),
            unit_encoded: Some(30),
            scale,
            values,
            ..Default::default()
        }],
        ..Default::default()
    };
    let resolver = SingleMeter {
        meter: EnergyMeter {
            id: meter_id.into(),
            ..Default::default()
        },
        keys: Vec::new(),
    };
    (session, resolver)
}
