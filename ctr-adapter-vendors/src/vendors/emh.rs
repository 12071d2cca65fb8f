//! EMHCrypt01
//!
//! Same 320-byte frame as GDF with EMH's own cells. Timestamps carry the
//! local UTC offset added to the epoch; several registers are little-endian.
//!
//! | Offset | Width | Field |
//! |--------|-------|-------|
//! | 0 | 10 | meter id (hex) |
//! | 10 | 4 | timestamp + local offset |
//! | 14 | 1 | info status (hex) |
//! | 15 | 4 | seconds index, LE |
//! | 19 | 4 | pagination id (hex, reversed) |
//! | 23 | 6 | OBIS |
//! | 29 | 1 | unit |
//! | 30 | 1 | scale |
//! | 31 | 8 | value register, LE |
//! | 39 | 2 | log book index (hex) |
//! | 41 | var | authorization start id (UTF-8) |
//! | 169 | 4 | authorization start timestamp + local offset |
//!
//! SHA-256 truncated to 24 bytes, secp192r1, raw r/s.

use ctr_core::{
    ChargingSession, CryptoResult, Curve, Endian, HashAlgorithm, LayoutBuilder, Measurement,
    MeasurementValue,
};

use super::common::{
    layout_failure, raw_value, require_meter, required, unit_code, verify_signed_bytes,
    CryptoParams, SignatureDefault,
};
use super::{MeasurementContext, SessionFormat, SessionVerifier};
use crate::error::Result;

pub const LAYOUT_SIZE: usize = 320;

const PARAMS: CryptoParams =
    CryptoParams::new(HashAlgorithm::Sha256, Curve::Secp192r1).with_truncation(24);

pub fn signed_layout(
    meter_id: &str,
    session: &ChargingSession,
    measurement: &Measurement,
    value: &MeasurementValue,
) -> Result<LayoutBuilder> {
    let timestamp = required(value.timestamp.as_ref(), "timestamp")?;
    let info_status = required(value.info_status.as_deref(), "infoStatus")?;
    let seconds_index = required(value.seconds_index, "secondsIndex")?;
    let pagination_id = required(value.pagination_id.as_deref(), "paginationId")?;
    let log_book_index = required(value.log_book_index.as_deref(), "logBookIndex")?;
    let obis = required(measurement.obis.as_ref(), "obis")?;
    let auth = required(session.authorization_start.as_ref(), "authorizationStart")?;
    let auth_timestamp = required(auth.timestamp.as_ref(), "authorizationStart.timestamp")?;

    let mut layout = LayoutBuilder::fixed(LAYOUT_SIZE);
    layout
        .hex_at("meterId", 0, meter_id, false)?
        .timestamp32_at("timestamp", 10, timestamp, true)?
        .hex_at("infoStatus", 14, info_status, false)?
        .uint32_at("secondsIndex", 15, seconds_index, Endian::Little)?
        .hex_at("paginationId", 19, pagination_id, true)?
        .obis_at("obis", 23, obis)?
        .uint8_at("unitEncoded", 29, u64::from(unit_code(measurement)?))?
        .int8_at("scale", 30, i64::from(measurement.scale))?
        .uint64_at("value", 31, raw_value(value.value, measurement.scale)?, Endian::Little)?
        .hex_at("logBookIndex", 39, log_book_index, false)?
        .text_at("authorizationStart", 41, &auth.id)?
        .timestamp32_at("authorizationStartTimestamp", 169, auth_timestamp, true)?;
    Ok(layout)
}

pub struct EmhVerifier;

impl SessionVerifier for EmhVerifier {
    fn format(&self) -> SessionFormat {
        SessionFormat::Emh
    }

    fn verify_measurement(&self, ctx: &MeasurementContext<'_>, value: &MeasurementValue) -> CryptoResult {
        let meter = match require_meter(ctx) {
            Ok(meter) => meter,
            Err(result) => return result,
        };
        let params = PARAMS.for_context(ctx);
        match signed_layout(&meter.id, ctx.session, ctx.measurement, value) {
            Ok(layout) => verify_signed_bytes(ctx, value, &params, layout, SignatureDefault::Concatenated),
            Err(e) => layout_failure(&params, e),
        }
    }
}
