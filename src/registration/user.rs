use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

use super::responder::KNOWN_FRIEND_DNIS;

const FIRST_NAMES: [&str; 10] = [
    "Lucia", "Mateo", "Sofia", "Santiago", "Valentina", "Sebastian", "Isabella", "Matias",
    "Camila", "Nicolas",
];
const LAST_NAMES: [&str; 10] = [
    "Gomez", "Rodriguez", "Diaz", "Perez", "Vargas", "Castro", "Sanchez", "Rojas", "Ortiz",
    "Silva",
];
const MAIL_DOMAINS: [&str; 4] = ["example.com", "test.net", "demo.org", "mailservice.io"];
const DNI_LEN: usize = 8;
const MAX_FRIENDS: usize = 3;

/// Registration request as the storage service expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistration {
    pub nombre: String,
    pub correo: String,
    pub clave: String,
    pub dni: String,
    pub telefono: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amigos: Option<Vec<String>>,
}

impl UserRegistration {
    /// Checks the DNI of the user and of every listed friend.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidDni`] for a DNI that is not exactly
    /// eight digits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_dni(&self.dni)?;
        for friend in self.amigos.iter().flatten() {
            validate_dni(friend)?;
        }
        Ok(())
    }
}

fn validate_dni(dni: &str) -> Result<(), ValidationError> {
    if dni.len() == DNI_LEN && dni.bytes().all(|byte| byte.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidDni {
            value: dni.to_owned(),
        })
    }
}

/// Random user drawn from the thread-local generator.
#[must_use]
pub fn generate_random_user() -> UserRegistration {
    generate_user(&mut rand::thread_rng())
}

/// Random user with an eight-digit DNI, a nine-digit phone number starting
/// with 9 and, half of the time, one to three distinct friends taken from
/// [`KNOWN_FRIEND_DNIS`] (never the user's own DNI).
#[must_use]
pub fn generate_user<R>(rng: &mut R) -> UserRegistration
where
    R: Rng + ?Sized,
{
    let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Lucia");
    let last = LAST_NAMES.choose(rng).copied().unwrap_or("Gomez");
    let domain = MAIL_DOMAINS.choose(rng).copied().unwrap_or("example.com");
    let dni = rng.gen_range(10_000_000_u32..100_000_000).to_string();
    let telefono = format!("9{}", rng.gen_range(10_000_000_u32..100_000_000));

    let amigos = if rng.gen_bool(0.5) {
        let wanted = rng.gen_range(1..=MAX_FRIENDS);
        let candidates: Vec<&str> = KNOWN_FRIEND_DNIS
            .iter()
            .copied()
            .filter(|candidate| *candidate != dni)
            .collect();
        let friends: Vec<String> = candidates
            .choose_multiple(rng, wanted)
            .map(|friend| (*friend).to_owned())
            .collect();
        (!friends.is_empty()).then_some(friends)
    } else {
        None
    };

    UserRegistration {
        nombre: format!("{} {}", first, last),
        correo: format!(
            "{}.{}{}@{}",
            first.to_lowercase(),
            last.to_lowercase(),
            rng.gen_range(0..1_000_u32),
            domain
        ),
        clave: format!("pass{}", rng.gen_range(1_000..10_000_u32)),
        dni,
        telefono,
        amigos,
    }
}
