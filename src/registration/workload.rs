use crate::load::{ReplyVerdict, Workload};
use crate::rpc::Reply;

use super::{RegistrationReply, generate_random_user};

/// Registers a fresh random user per request and judges replies by their
/// `status` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationWorkload;

impl Workload for RegistrationWorkload {
    fn payload(&self, _sequence: u64) -> Result<Vec<u8>, String> {
        let user = generate_random_user();
        serde_json::to_vec(&user).map_err(|err| format!("could not encode user: {}", err))
    }

    fn classify(&self, reply: &Reply) -> ReplyVerdict {
        match reply.json::<RegistrationReply>() {
            Ok(body) if body.is_success() => ReplyVerdict::Accepted,
            Ok(body) => ReplyVerdict::Rejected(body.message),
            Err(err) => ReplyVerdict::Malformed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationId;
    use crate::registration::UserRegistration;

    fn reply(body: &str) -> Reply {
        Reply::new(CorrelationId::generate(), body.as_bytes().to_vec())
    }

    #[test]
    fn payload_is_a_valid_registration() -> Result<(), String> {
        let payload = RegistrationWorkload.payload(0)?;
        let user: UserRegistration =
            serde_json::from_slice(&payload).map_err(|err| err.to_string())?;
        user.validate().map_err(|err| err.to_string())
    }

    #[test]
    fn replies_are_classified_by_status() -> Result<(), String> {
        let cases = [
            (r#"{"status":"success","message":"ok"}"#, ReplyVerdict::Accepted),
            (
                r#"{"status":"error","message":"duplicate"}"#,
                ReplyVerdict::Rejected("duplicate".to_owned()),
            ),
        ];
        for (body, expected) in cases {
            let verdict = RegistrationWorkload.classify(&reply(body));
            if verdict != expected {
                return Err(format!("{} -> {:?}", body, verdict));
            }
        }
        match RegistrationWorkload.classify(&reply("not json")) {
            ReplyVerdict::Malformed(_) => Ok(()),
            other => Err(format!("expected Malformed, got {:?}", other)),
        }
    }
}
