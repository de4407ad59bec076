use std::num::NonZeroU32;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::OsRng;
use rand::Rng;

use super::hash::{find_proofs, hash_password, ScramHash};
use crate::error::{Field, ScramClientError as Error};
use crate::transport::ChannelBindingType;
use crate::NONCE_LENGTH;

/// Splits off the value of a `k=` attribute, or fails with `ExpectedField(field)`.
macro_rules! parse_part {
    ($part: expr, $field: ident, $key: expr) => {
        match $part {
            Some(part) if part.starts_with($key) => &part[2..],
            _ => return Err(Error::ExpectedField(Field::$field)),
        }
    };
}

/// Parses a `server_first_message` returning a (nonce, salt, iterations) tuple if successful.
fn parse_server_first(data: &str) -> Result<(&str, Vec<u8>, NonZeroU32), Error> {
    if data.starts_with("m=") {
        return Err(Error::UnsupportedExtension);
    }
    let mut parts = data.split(',');
    let nonce = parse_part!(parts.next(), Nonce, "r=");
    let salt = STANDARD
        .decode(parse_part!(parts.next(), Salt, "s="))
        .map_err(|_| Error::InvalidField(Field::Salt))?;
    let iterations = parse_part!(parts.next(), Iterations, "i=")
        .parse()
        .map_err(|_| Error::InvalidField(Field::Iterations))?;
    Ok((nonce, salt, iterations))
}

/// Generates a printable nonce without commas.
fn generate_nonce<R: Rng>(rng: &mut R) -> String {
    let range = Uniform::new(33u8, 125);
    (0..NONCE_LENGTH)
        .map(|_| {
            let x = range.sample(&mut *rng);
            if x > 43 {
                (x + 1) as char
            } else {
                x as char
            }
        })
        .collect()
}

/// The initial state of the client side of a SCRAM exchange.
#[derive(Debug)]
pub struct ClientFirst<'a> {
    hash: ScramHash,
    authcid: &'a str,
    authzid: Option<&'a str>,
    password: &'a str,
    nonce: String,
    channel_binding: Option<(ChannelBindingType, Vec<u8>)>,
}

impl<'a> ClientFirst<'a> {
    /// Constructs an initial state using the provided credentials and a nonce drawn from the OS
    /// random number generator.
    ///
    /// # Arguments
    ///
    /// * hash - The hash function of the mechanism.
    /// * authcid - An username used for authentication.
    /// * password - A password used to prove that the user is authentic.
    /// * authzid - An username used for authorization. If `authzid` is `None` the authorized
    /// username will be the same as the authenticated username.
    pub fn new(hash: ScramHash, authcid: &'a str, password: &'a str, authzid: Option<&'a str>) -> Self {
        Self::with_rng(hash, authcid, password, authzid, &mut OsRng)
    }

    /// Like [`new`](#method.new) with a custom random number generator. Please only use a
    /// cryptographically secure random number generator!
    pub fn with_rng<R: Rng>(
        hash: ScramHash,
        authcid: &'a str,
        password: &'a str,
        authzid: Option<&'a str>,
        rng: &mut R,
    ) -> Self {
        Self::with_nonce(hash, authcid, password, authzid, generate_nonce(rng))
    }

    /// Like [`new`](#method.new) with a fixed client nonce.
    pub fn with_nonce(
        hash: ScramHash,
        authcid: &'a str,
        password: &'a str,
        authzid: Option<&'a str>,
        nonce: String,
    ) -> Self {
        ClientFirst {
            hash: hash,
            authcid: authcid,
            authzid: authzid,
            password: password,
            nonce: nonce,
            channel_binding: None,
        }
    }

    /// Requires channel binding of type `binding` using the transport's binding `data`.
    pub fn with_channel_binding(mut self, binding: ChannelBindingType, data: Vec<u8>) -> Self {
        self.channel_binding = Some((binding, data));
        self
    }

    /// Returns the next state and the first client message.
    pub fn client_first(self) -> (ServerFirst<'a>, String) {
        let bind_flag = match self.channel_binding {
            Some((binding, _)) => format!("p={}", binding.name()),
            None => "n".to_string(),
        };
        let gs2header = match self.authzid {
            Some(authzid) => format!("{},a={},", bind_flag, authzid),
            None => format!("{},,", bind_flag),
        };
        let escaped_authcid = self.authcid.replace('=', "=3D").replace(',', "=2C");
        let client_first_bare = format!("n={},r={}", escaped_authcid, self.nonce);
        let client_first = format!("{}{}", gs2header, client_first_bare);

        let mut cbind_input = gs2header.into_bytes();
        if let Some((_, data)) = self.channel_binding {
            cbind_input.extend_from_slice(&data);
        }
        let server_first = ServerFirst {
            hash: self.hash,
            password: self.password,
            client_nonce: self.nonce,
            client_first_bare: client_first_bare,
            cbind_input: cbind_input,
        };
        (server_first, client_first)
    }
}

/// The second state after the first client message was computed.
#[derive(Debug)]
pub struct ServerFirst<'a> {
    hash: ScramHash,
    password: &'a str,
    client_nonce: String,
    client_first_bare: String,
    cbind_input: Vec<u8>,
}

impl<'a> ServerFirst<'a> {
    /// Processes the first answer from the server and returns the next state or an error.
    ///
    /// The salt announced by the server already carries the server's pepper, so it is used
    /// verbatim for PBKDF2.
    pub fn handle_server_first(self, server_first: &str) -> Result<ClientFinal, Error> {
        let (nonce, salt, iterations) = parse_server_first(server_first)?;
        if !nonce.starts_with(&self.client_nonce) {
            return Err(Error::InvalidNonce);
        }

        let salted_password = hash_password(self.hash, self.password.as_bytes(), &salt, iterations);
        let client_final_without_proof = format!("c={},r={}", STANDARD.encode(&self.cbind_input), nonce);
        let (client_proof, server_signature) = find_proofs(
            self.hash,
            &self.client_first_bare,
            server_first,
            &client_final_without_proof,
            &salted_password,
        );

        let client_final = format!(
            "{},p={}",
            client_final_without_proof,
            STANDARD.encode(&client_proof)
        );
        Ok(ClientFinal {
            server_signature: server_signature,
            client_final: client_final,
        })
    }
}

/// The third state after the first server message was successfully processed.
#[derive(Debug)]
pub struct ClientFinal {
    server_signature: Vec<u8>,
    client_final: String,
}

impl ClientFinal {
    /// Returns the next state and the final client message.
    #[inline]
    pub fn client_final(self) -> (ServerFinal, String) {
        let server_final = ServerFinal {
            server_signature: self.server_signature,
        };
        (server_final, self.client_final)
    }
}

/// The final state after the final client message was computed.
#[derive(Debug)]
pub struct ServerFinal {
    server_signature: Vec<u8>,
}

impl ServerFinal {
    /// Processes the final answer from the server and returns the authentication result.
    ///
    /// * `Ok(())` signals a successful authentication attempt.
    /// * `Err(Error::InvalidServer)` or `Err(Error::Authentication(_))` means that the
    /// authentication request was rejected.
    pub fn handle_server_final(self, server_final: &str) -> Result<(), Error> {
        if server_final.starts_with("v=") {
            let verifier = STANDARD
                .decode(&server_final[2..])
                .map_err(|_| Error::InvalidField(Field::VerifyOrError))?;
            if self.server_signature == verifier {
                Ok(())
            } else {
                Err(Error::InvalidServer)
            }
        } else if server_final.starts_with("e=") {
            Err(Error::Authentication(server_final[2..].to_string()))
        } else {
            Err(Error::ExpectedField(Field::VerifyOrError))
        }
    }
}
