//! Control-parameter responder.
//!
//! Runs once per `ApplyControlParameters` turn. The simulator bumps the
//! request number for each new request; the response number echoes the last
//! request handled, so a turn whose request number is not ahead of the
//! response carries nothing new.

use crate::error::BridgeError;
use crate::params::ControlParameters;
use quad::params::{ParameterName, ParameterValue, RequestKind};
use quad::shm::message::{ControlParameterRequest, ControlParameterResponse};
use tracing::{info, warn};

/// What a parameter turn did.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
    /// No new request since the last response. Nothing was touched.
    Redundant { request_number: u64 },
    /// The request was applied and acknowledged.
    Applied {
        request_number: u64,
        kind: RequestKind,
        name: ParameterName,
        value: ParameterValue,
    },
    /// A user parameter was addressed but the controller has no user table.
    /// The request is acknowledged with its own value echoed back.
    NoUserTable {
        request_number: u64,
        name: ParameterName,
    },
}

/// Handle the pending request, if any, and write the response.
pub fn respond(
    request: &ControlParameterRequest,
    response: &mut ControlParameterResponse,
    robot: &mut ControlParameters,
    user: Option<&mut ControlParameters>,
) -> Result<RpcOutcome, BridgeError> {
    let request_number = request.request_number;
    if request_number <= response.request_number {
        warn!(
            request_number,
            response_number = response.request_number,
            "Parameter turn without a new request"
        );
        return Ok(RpcOutcome::Redundant { request_number });
    }
    if request_number - response.request_number != 1 {
        return Err(BridgeError::TooManyPendingRequests {
            request: request_number,
            response: response.request_number,
        });
    }

    let kind = request.request_kind()?;
    let name = request.name()?;
    let requested = request.value_kind()?;
    let n_parameters = robot.len();

    let table = if kind.is_user() {
        match user {
            Some(table) => table,
            None => {
                warn!(%name, "User parameter requested but the controller has no user parameters");
                response.acknowledge(request, request.value()?, n_parameters);
                return Ok(RpcOutcome::NoUserTable {
                    request_number,
                    name,
                });
            }
        }
    } else {
        robot
    };

    let stored = table
        .lookup(&name)
        .map(|p| p.kind())
        .ok_or_else(|| BridgeError::UnknownParameter {
            name: name.to_string(),
            table: table.table().to_string(),
        })?;
    if stored != requested {
        return Err(BridgeError::TypeMismatch {
            name: name.to_string(),
            stored,
            requested,
        });
    }

    if kind.is_set() {
        table.set(&name, request.value()?)?;
    }
    let value = table.get(&name)?;
    response.acknowledge(request, value, n_parameters);

    info!(request_number, %kind, %name, %value, "Control parameter request handled");
    Ok(RpcOutcome::Applied {
        request_number,
        kind,
        name,
        value,
    })
}
