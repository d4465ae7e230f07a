//! The ntor handshake, with which every hop of a circuit is
//! negotiated.
//!
//! The client sends its ephemeral curve25519 public key along with
//! the relay's identity and onion key; the relay answers with its own
//! ephemeral key and an HMAC that proves it holds the onion key's
//! secret half.  Both sides then expand the shared secret into the
//! hop's cipher keys and digest seeds.

use super::KeyGenerator;
use crate::crypto::kdf;
use crate::router::RelayId;
use crate::util::ct;
use crate::{Error, Result, SecretBytes};

use torlink_cell::wire::{Reader, Writer};

use hmac::{Hmac, Mac, NewMac};
use rand::{CryptoRng, Rng};
use sha2::Sha256;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};
use zeroize::Zeroizing;

/// The ntor protocol id, used to diversify all derived values.
const PROTOID: &[u8] = b"ntor-curve25519-sha256-1";
/// HMAC key for the verification value.
const T_VERIFY: &[u8] = b"ntor-curve25519-sha256-1:verify";
/// HMAC key for the authentication tag.
const T_MAC: &[u8] = b"ntor-curve25519-sha256-1:mac";
/// Role string mixed into the relay's authentication tag.
const SERVER_STR: &[u8] = b"Server";

/// The length of the client's handshake message: ID || B || X.
pub(crate) const CLIENT_HANDSHAKE_LEN: usize = 20 + 32 + 32;
/// The length of the relay's reply: Y || AUTH.
pub(crate) const SERVER_HANDSHAKE_LEN: usize = 32 + 32;

/// The public keys a client needs to extend a circuit to a relay.
#[derive(Clone)]
pub(crate) struct NtorPublicKey {
    /// The relay's identity fingerprint, mixed into the derivation to
    /// bind the handshake to one relay.
    pub(crate) id: RelayId,
    /// The relay's medium-term curve25519 onion key.
    pub(crate) pk: PublicKey,
}

/// The keys a relay needs to answer an ntor handshake.
///
/// We only ever act as a client on the real network; the server side
/// exists so circuits can be exercised against simulated relays.
pub(crate) struct NtorSecretKey {
    /// Public half, as the client knows it.
    pk: NtorPublicKey,
    /// Secret half of the onion key.
    sk: StaticSecret,
}

impl NtorSecretKey {
    /// Construct an NtorSecretKey from its parts.
    pub(crate) fn new(sk: StaticSecret, pk: PublicKey, id: RelayId) -> Self {
        NtorSecretKey {
            pk: NtorPublicKey { id, pk },
            sk,
        }
    }
}

/// Client state between sending its handshake and receiving the
/// relay's reply.
pub(crate) struct NtorHandshakeState {
    /// The relay we are handshaking with.
    relay_public: NtorPublicKey,
    /// Our ephemeral secret x.
    ///
    /// This is a StaticSecret, not an EphemeralSecret, because we
    /// need it for two Diffie-Hellman operations.
    my_sk: StaticSecret,
    /// Our ephemeral public key X.
    my_public: PublicKey,
}

/// Expands an ntor shared secret into hop key material.
pub(crate) struct NtorHkdfKeyGenerator {
    /// The secret_input value from the handshake.
    seed: SecretBytes,
}

impl KeyGenerator for NtorHkdfKeyGenerator {
    fn expand(self, keylen: usize) -> Result<SecretBytes> {
        kdf::ntor1_derive(&self.seed[..], keylen)
    }
}

/// An HMAC-SHA256 authentication tag.
type AuthTag = [u8; 32];

/// Begin a client handshake with `relay_public`, returning the state
/// to finish it with and the message to put in a CREATE2 or EXTEND2.
pub(crate) fn client_handshake<R>(
    rng: &mut R,
    relay_public: &NtorPublicKey,
) -> (NtorHandshakeState, Vec<u8>)
where
    R: Rng + CryptoRng,
{
    let my_sk = StaticSecret::from(rng.gen::<[u8; 32]>());
    let my_public = PublicKey::from(&my_sk);
    client_handshake_no_keygen(my_public, my_sk, relay_public)
}

/// Helper: the client handshake with caller-provided keys, so the
/// test vectors can drive it deterministically.
fn client_handshake_no_keygen(
    my_public: PublicKey,
    my_sk: StaticSecret,
    relay_public: &NtorPublicKey,
) -> (NtorHandshakeState, Vec<u8>) {
    let mut v: Vec<u8> = Vec::with_capacity(CLIENT_HANDSHAKE_LEN);
    v.write_all(relay_public.id.as_bytes());
    v.write_all(relay_public.pk.as_bytes());
    v.write_all(my_public.as_bytes());

    let state = NtorHandshakeState {
        relay_public: relay_public.clone(),
        my_sk,
        my_public,
    };
    (state, v)
}

/// Finish a client handshake, given the relay's `Y || AUTH` reply.
///
/// Verifies the authentication tag before any key material escapes;
/// on mismatch the hop must be abandoned.
pub(crate) fn client_complete<T: AsRef<[u8]>>(
    state: &NtorHandshakeState,
    msg: T,
) -> Result<NtorHkdfKeyGenerator> {
    let mut r = Reader::from_slice(msg.as_ref());
    let their_pk = PublicKey::from(r.extract::<[u8; 32]>()?);
    let auth: AuthTag = r.extract()?;

    let xy = state.my_sk.diffie_hellman(&their_pk);
    let xb = state.my_sk.diffie_hellman(&state.relay_public.pk);

    let (keygen, authcode) = ntor_derive(
        &xy,
        &xb,
        &state.relay_public,
        &state.my_public,
        &their_pk,
    );

    if !ct::bytes_eq(&authcode[..], &auth[..]) {
        return Err(Error::BadHandshake);
    }
    Ok(keygen)
}

/// Answer an ntor handshake as a relay would.
pub(crate) fn server_handshake<R, T>(
    rng: &mut R,
    msg: T,
    keys: &[NtorSecretKey],
) -> Result<(NtorHkdfKeyGenerator, Vec<u8>)>
where
    R: Rng + CryptoRng,
    T: AsRef<[u8]>,
{
    let ephem = StaticSecret::from(rng.gen::<[u8; 32]>());
    let ephem_pub = PublicKey::from(&ephem);
    server_handshake_no_keygen(ephem_pub, ephem, msg, keys)
}

/// Helper: the server handshake with a caller-provided ephemeral key.
fn server_handshake_no_keygen<T: AsRef<[u8]>>(
    ephem_pub: PublicKey,
    ephem: StaticSecret,
    msg: T,
    keys: &[NtorSecretKey],
) -> Result<(NtorHkdfKeyGenerator, Vec<u8>)> {
    let mut r = Reader::from_slice(msg.as_ref());
    let my_id: [u8; 20] = r.extract()?;
    let my_key = PublicKey::from(r.extract::<[u8; 32]>()?);
    let their_pk = PublicKey::from(r.extract::<[u8; 32]>()?);

    let keypair = keys
        .iter()
        .find(|k| ct::bytes_eq(k.pk.pk.as_bytes(), my_key.as_bytes()))
        .ok_or(Error::BadHandshake)?;
    if !ct::bytes_eq(&my_id[..], keypair.pk.id.as_bytes()) {
        return Err(Error::BadHandshake);
    }

    let xy = ephem.diffie_hellman(&their_pk);
    let xb = keypair.sk.diffie_hellman(&their_pk);

    let (keygen, authcode) = ntor_derive(&xy, &xb, &keypair.pk, &their_pk, &ephem_pub);

    let mut reply: Vec<u8> = Vec::with_capacity(SERVER_HANDSHAKE_LEN);
    reply.write_all(ephem_pub.as_bytes());
    reply.write_all(&authcode[..]);
    Ok((keygen, reply))
}

/// Compute the key generator and authentication tag from the two
/// shared secrets and the public parameters.
///
/// Parameter names follow the protocol: B is the relay's onion key,
/// X the client's ephemeral key, Y the relay's ephemeral key.
fn ntor_derive(
    xy: &SharedSecret,
    xb: &SharedSecret,
    relay_pk: &NtorPublicKey,
    x: &PublicKey,
    y: &PublicKey,
) -> (NtorHkdfKeyGenerator, AuthTag) {
    let mut secret_input: SecretBytes = Zeroizing::new(Vec::new());
    secret_input.write_all(xy.as_bytes()); // EXP(Y,x)
    secret_input.write_all(xb.as_bytes()); // EXP(B,x)
    secret_input.write_all(relay_pk.id.as_bytes()); // ID
    secret_input.write_all(relay_pk.pk.as_bytes()); // B
    secret_input.write_all(x.as_bytes()); // X
    secret_input.write_all(y.as_bytes()); // Y
    secret_input.write_all(PROTOID); // PROTOID

    let verify = {
        let mut m =
            Hmac::<Sha256>::new_from_slice(T_VERIFY).expect("Hmac allows keys of any size");
        m.update(&secret_input[..]);
        m.finalize().into_bytes()
    };
    let mut auth_input: SecretBytes = Zeroizing::new(Vec::new());
    auth_input.write_all(&verify[..]);
    auth_input.write_all(relay_pk.id.as_bytes()); // ID
    auth_input.write_all(relay_pk.pk.as_bytes()); // B
    auth_input.write_all(y.as_bytes()); // Y
    auth_input.write_all(x.as_bytes()); // X
    auth_input.write_all(PROTOID); // PROTOID
    auth_input.write_all(SERVER_STR); // "Server"

    let auth_mac = {
        let mut m = Hmac::<Sha256>::new_from_slice(T_MAC).expect("Hmac allows keys of any size");
        m.update(&auth_input[..]);
        m.finalize().into_bytes()
    };
    let mut auth = [0u8; 32];
    auth.copy_from_slice(&auth_mac[..]);

    let keygen = NtorHkdfKeyGenerator { seed: secret_input };
    (keygen, auth)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn agreement() -> Result<()> {
        let mut rng = rand::thread_rng();
        let relay_secret = StaticSecret::from(rng.gen::<[u8; 32]>());
        let relay_public = PublicKey::from(&relay_secret);
        let relay_id = RelayId::from_bytes(&[12; 20]).unwrap();
        let relay_ntpk = NtorPublicKey {
            id: relay_id,
            pk: relay_public,
        };
        let (state, cmsg) = client_handshake(&mut rng, &relay_ntpk);
        assert_eq!(cmsg.len(), CLIENT_HANDSHAKE_LEN);

        let relay_ntsks = [NtorSecretKey::new(relay_secret, relay_public, relay_id)];
        let (skeygen, smsg) = server_handshake(&mut rng, &cmsg, &relay_ntsks)?;
        assert_eq!(smsg.len(), SERVER_HANDSHAKE_LEN);

        let ckeygen = client_complete(&state, smsg)?;
        let skeys = skeygen.expand(72)?;
        let ckeys = ckeygen.expand(72)?;
        assert_eq!(&skeys[..], &ckeys[..]);
        Ok(())
    }

    #[test]
    fn testvec() -> Result<()> {
        use hex_literal::hex;

        let b_sk = hex!("4820544f4c4420594f5520444f474954204b454550532048415050454e494e47");
        let b_pk = hex!("ccbc8541904d18af08753eae967874749e6149f873de937f57f8fd903a21c471");
        let x_sk = hex!("706f6461792069207075742e2e2e2e2e2e2e2e4a454c4c59206f6e2074686973");
        let x_pk = hex!("e65dfdbef8b2635837fe2cebc086a8096eae3213e6830dc407516083d412b078");
        let y_sk = hex!("70686520737175697272656c2e2e2e2e2e2e2e2e686173206869732067616d65");
        let y_pk = hex!("390480a14362761d6aec1fea840f6e9e928fb2adb7b25c670be1045e35133a37");
        let id = hex!("69546f6c64596f7541626f75745374616972732e");
        let client_handshake = hex!(
            "69546f6c64596f7541626f75745374616972732eccbc8541904d18af08753e"
            "ae967874749e6149f873de937f57f8fd903a21c471e65dfdbef8b2635837fe"
            "2cebc086a8096eae3213e6830dc407516083d412b078"
        );
        let server_handshake = hex!(
            "390480a14362761d6aec1fea840f6e9e928fb2adb7b25c670be1045e35133a"
            "371cbdf68b89923e1f85e8e18ee6e805ea333fe4849c790ffd2670bd80fec9"
            "5cc8"
        );
        let keys = hex!(
            "0c62dee7f48893370d0ef896758d35729867beef1a5121df80e00f79ed349a"
            "f39b51cae125719182f19d932a667dae1afbf2e336e6910e7822223e763afa"
            "d0a13342157969dc6b79"
        );

        let relay_pk = NtorPublicKey {
            id: RelayId::from_bytes(&id).unwrap(),
            pk: b_pk.into(),
        };
        let relay_sk = NtorSecretKey {
            pk: relay_pk.clone(),
            sk: b_sk.into(),
        };

        let (state, create_msg) =
            client_handshake_no_keygen(x_pk.into(), x_sk.into(), &relay_pk);
        assert_eq!(&create_msg[..], &client_handshake[..]);

        let (s_keygen, created_msg) = server_handshake_no_keygen(
            y_pk.into(),
            y_sk.into(),
            &create_msg[..],
            &[relay_sk],
        )?;
        assert_eq!(&created_msg[..], &server_handshake[..]);

        let c_keygen = client_complete(&state, created_msg)?;

        let c_keys = c_keygen.expand(keys.len())?;
        let s_keys = s_keygen.expand(keys.len())?;
        assert_eq!(&c_keys[..], &keys[..]);
        assert_eq!(&s_keys[..], &keys[..]);
        Ok(())
    }

    #[test]
    fn failing_handshakes() {
        let mut rng = rand::thread_rng();

        let relay_secret = StaticSecret::from(rng.gen::<[u8; 32]>());
        let relay_public = PublicKey::from(&relay_secret);
        let wrong_public = PublicKey::from([16u8; 32]);
        let relay_id = RelayId::from_bytes(&[12; 20]).unwrap();
        let wrong_id = RelayId::from_bytes(&[13; 20]).unwrap();
        let relay_ntpk = NtorPublicKey {
            id: relay_id,
            pk: relay_public,
        };
        let relay_ntsks = [NtorSecretKey::new(relay_secret, relay_public, relay_id)];
        let wrong_ntpk1 = NtorPublicKey {
            id: wrong_id,
            pk: relay_public,
        };
        let wrong_ntpk2 = NtorPublicKey {
            id: relay_id,
            pk: wrong_public,
        };

        // A relay rejects a handshake for keys it doesn't hold.
        let (_, handshake1) = client_handshake(&mut rng, &wrong_ntpk1);
        let (_, handshake2) = client_handshake(&mut rng, &wrong_ntpk2);
        assert!(server_handshake(&mut rng, &handshake1, &relay_ntsks).is_err());
        assert!(server_handshake(&mut rng, &handshake2, &relay_ntsks).is_err());

        // A client rejects a tampered reply.
        let (state, handshake3) = client_handshake(&mut rng, &relay_ntpk);
        let (_, mut smsg) = server_handshake(&mut rng, &handshake3, &relay_ntsks).unwrap();
        smsg[60] ^= 7;
        assert!(matches!(
            client_complete(&state, smsg),
            Err(Error::BadHandshake)
        ));
    }
}
