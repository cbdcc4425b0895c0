//! Conversion between wire messages and the internal request/response forms.

use crate::error::RequestError;
use crate::server::proto;
use crate::telemetry::{TimingRecord, UtilizationSample};
use crate::types::{CorrelationId, ItemId, Query, RequestKind, UnpackedRequest, UserId};

/// Validate a wire request into a tagged [`UnpackedRequest`].
///
/// Only presence and representability are checked here; range checks
/// against the trained model belong to the rating engine.
pub fn unpack_request(request: &proto::CfRequest) -> Result<UnpackedRequest, RequestError> {
    let user = UserId(wire_id(request.user_id, "user_id")?);
    let item = ItemId(wire_id(request.item_id, "item_id")?);
    let query = Query::new(user, item);

    let probe = request
        .util_request
        .as_ref()
        .map_or(false, |u| u.util_request);
    let kind = if probe {
        RequestKind::UtilizationProbe(query)
    } else {
        RequestKind::Rating(query)
    };

    Ok(UnpackedRequest {
        id: CorrelationId(request.request_id),
        kind,
    })
}

fn wire_id(value: Option<i64>, field: &str) -> Result<u32, RequestError> {
    let raw = value.ok_or_else(|| RequestError::MalformedRequest(format!("{} is missing", field)))?;
    u32::try_from(raw).map_err(|_| {
        RequestError::MalformedRequest(format!("{} {} is not a valid identifier", field, raw))
    })
}

/// Build the utilization section of a response.
fn util_response(utilization: Option<UtilizationSample>) -> proto::UtilResponse {
    match utilization {
        Some(s) => proto::UtilResponse {
            util_present: true,
            user_time: s.user_time,
            system_time: s.system_time,
            io_time: s.io_time,
            idle_time: s.idle_time,
        },
        None => proto::UtilResponse::default(),
    }
}

/// Pack a successful prediction. Timing is attached separately, once the
/// pack stage itself has been measured.
pub fn pack_response(
    id: CorrelationId,
    rating: f32,
    utilization: Option<UtilizationSample>,
) -> proto::CfResponse {
    proto::CfResponse {
        request_id: id.value(),
        rating: Some(rating),
        util_response: Some(util_response(utilization)),
        timing_data_in_micro: None,
        error: None,
    }
}

/// Pack an application-level failure; the correlation id is still echoed.
pub fn pack_error(
    id: CorrelationId,
    error: &RequestError,
    utilization: Option<UtilizationSample>,
    timing: &TimingRecord,
) -> proto::CfResponse {
    let mut response = proto::CfResponse {
        request_id: id.value(),
        rating: None,
        util_response: Some(util_response(utilization)),
        timing_data_in_micro: None,
        error: Some(proto::CfError::from(error)),
    };
    attach_timing(&mut response, timing);
    response
}

pub fn attach_timing(response: &mut proto::CfResponse, timing: &TimingRecord) {
    response.timing_data_in_micro = Some(proto::TimingDataInMicro {
        unpack_us: timing.unpack_us,
        compute_us: timing.compute_us,
        pack_us: timing.pack_us,
        cpu_util_percent: timing.cpu_util_percent,
    });
}
