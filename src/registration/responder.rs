use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::transport::{OutboundMessage, Responder, ScheduledReply};

use super::{RegistrationReply, UserRegistration};

/// DNIs already stored by the service; generated friend lists draw from
/// these.
pub const KNOWN_FRIEND_DNIS: [&str; 7] = [
    "20453629", "12345678", "87654321", "11111111", "22222222", "33333333", "44444444",
];

const ISO_TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Simulated storage service.
///
/// Stores each DNI once; a second registration of the same DNI is answered
/// with an error reply. Friend DNIs are kept only when they are already
/// registered. Replies are delayed by up to `max_delay`.
#[derive(Debug)]
pub struct RegistrationResponder {
    registered: Mutex<HashSet<String>>,
    next_user_id: AtomicU64,
    max_delay: Duration,
}

impl Default for RegistrationResponder {
    fn default() -> Self {
        Self::new(Duration::from_millis(20))
    }
}

impl RegistrationResponder {
    /// Service pre-loaded with [`KNOWN_FRIEND_DNIS`].
    #[must_use]
    pub fn new(max_delay: Duration) -> Self {
        let registered: HashSet<String> = KNOWN_FRIEND_DNIS
            .iter()
            .map(|dni| (*dni).to_owned())
            .collect();
        let first_free_id = u64::try_from(registered.len())
            .unwrap_or(0)
            .saturating_add(1);
        Self {
            registered: Mutex::new(registered),
            next_user_id: AtomicU64::new(first_free_id),
            max_delay,
        }
    }

    #[must_use]
    pub fn registered(&self) -> usize {
        self.registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn register(&self, user: &UserRegistration) -> RegistrationReply {
        let mut registered = self.registered.lock().unwrap_or_else(PoisonError::into_inner);
        if !registered.insert(user.dni.clone()) {
            return RegistrationReply::error(format!("Usuario con DNI {} ya existe", user.dni));
        }
        let saved_friends: Vec<String> = user
            .amigos
            .iter()
            .flatten()
            .filter(|friend| registered.contains(friend.as_str()))
            .cloned()
            .collect();
        drop(registered);

        let user_id = self.next_user_id.fetch_add(1, Ordering::Relaxed);
        RegistrationReply::success(
            format!("Usuario {} guardado correctamente", user.nombre),
            user_id,
            saved_friends,
        )
    }

    fn delay(&self) -> Duration {
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

impl Responder for RegistrationResponder {
    fn respond(&self, request: &OutboundMessage) -> Vec<ScheduledReply> {
        let reply = match serde_json::from_slice::<UserRegistration>(&request.payload) {
            Ok(user) => {
                debug!("Registering {} (DNI {})", user.nombre, user.dni);
                self.register(&user)
            }
            Err(err) => RegistrationReply::error(format!("Datos de usuario invalidos: {}", err)),
        };
        let reply = reply
            .with_timestamp(chrono::Local::now().format(ISO_TIMESTAMP).to_string())
            .with_correlation_id(request.correlation_id.clone());

        match serde_json::to_vec(&reply) {
            Ok(body) => vec![ScheduledReply::to(request, body).after(self.delay())],
            Err(err) => {
                debug!("Could not encode reply: {}", err);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Destination;

    fn request_for(user: &UserRegistration) -> Result<OutboundMessage, String> {
        Ok(OutboundMessage {
            destination: Destination::new("validation", "check"),
            correlation_id: "c-1".to_owned(),
            reply_to: "amq.gen-test".to_owned(),
            payload: serde_json::to_vec(user).map_err(|err| err.to_string())?,
        })
    }

    fn only_reply(replies: Vec<ScheduledReply>) -> Result<RegistrationReply, String> {
        let [reply] = <[ScheduledReply; 1]>::try_from(replies)
            .map_err(|replies| format!("expected one reply, got {}", replies.len()))?;
        if reply.message.correlation_id.as_deref() != Some("c-1") {
            return Err("reply must carry the request correlation id".to_owned());
        }
        serde_json::from_slice(&reply.message.payload).map_err(|err| err.to_string())
    }

    fn user(dni: &str, amigos: Option<Vec<String>>) -> UserRegistration {
        UserRegistration {
            nombre: "Ana Diaz".to_owned(),
            correo: "ana@example.com".to_owned(),
            clave: "pass1234".to_owned(),
            dni: dni.to_owned(),
            telefono: "912345678".to_owned(),
            amigos,
        }
    }

    #[test]
    fn duplicate_dni_is_rejected() -> Result<(), String> {
        let responder = RegistrationResponder::new(Duration::ZERO);
        let first = only_reply(responder.respond(&request_for(&user("55555555", None))?))?;
        if !first.is_success() || first.user_id.is_none() {
            return Err(format!("first registration should succeed: {:?}", first));
        }
        let second = only_reply(responder.respond(&request_for(&user("55555555", None))?))?;
        if second.is_success() || second.message != "Usuario con DNI 55555555 ya existe" {
            return Err(format!("duplicate must be rejected: {:?}", second));
        }
        Ok(())
    }

    #[test]
    fn only_existing_friends_are_saved() -> Result<(), String> {
        let responder = RegistrationResponder::new(Duration::ZERO);
        let friends = vec!["12345678".to_owned(), "99999999".to_owned()];
        let reply = only_reply(responder.respond(&request_for(&user("66666666", Some(friends)))?))?;
        if reply.amigos_guardados != Some(vec!["12345678".to_owned()]) {
            return Err(format!("unexpected saved friends {:?}", reply.amigos_guardados));
        }
        if reply.timestamp.is_none() {
            return Err("reply must be timestamped".to_owned());
        }
        Ok(())
    }

    #[test]
    fn user_ids_increase() -> Result<(), String> {
        let responder = RegistrationResponder::new(Duration::ZERO);
        let first = only_reply(responder.respond(&request_for(&user("10000001", None))?))?;
        let second = only_reply(responder.respond(&request_for(&user("10000002", None))?))?;
        match (first.user_id, second.user_id) {
            (Some(a), Some(b)) if b > a => Ok(()),
            other => Err(format!("user ids must increase: {:?}", other)),
        }
    }

    #[test]
    fn garbage_payload_gets_error_reply() -> Result<(), String> {
        let responder = RegistrationResponder::new(Duration::ZERO);
        let mut request = request_for(&user("10000003", None))?;
        request.payload = b"{\"nombre\":1}".to_vec();
        let reply = only_reply(responder.respond(&request))?;
        if reply.is_success() {
            return Err("invalid payload must not register".to_owned());
        }
        Ok(())
    }
}
