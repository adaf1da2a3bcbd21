//! Déchiffrement en ligne des flux chiffrés
//!
//! - Tidal : AES-128-CTR, compteur 64 bits big-endian préfixé par le nonce.
//! - Deezer : Blowfish-CBC par bandes. Un bloc de 2048 octets sur trois
//!   (0, 3, 6…) est chiffré, chacun avec l'IV `00..07` ; le dernier bloc
//!   partiel est en clair. Les zéros de bourrage en tête de flux sont retirés.
//!
//! Les clés sont fournies par les clients externes.

use crate::error::{Result, StreamError};
use crate::session::ByteStream;
use aes::Aes128;
use blowfish::Blowfish;
use bytes::Bytes;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use ctr::cipher::StreamCipher;
use futures::StreamExt;

type Aes128Ctr = ctr::Ctr64BE<Aes128>;
type BlowfishCbc = cbc::Decryptor<Blowfish>;

pub const DEEZER_BLOCK: usize = 2048;
const DEEZER_IV: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

/// Clé de flux Tidal, dérivée par le client externe
#[derive(Clone, PartialEq, Eq)]
pub struct CtrKey {
    pub key: [u8; 16],
    pub nonce: [u8; 8],
}

impl std::fmt::Debug for CtrKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CtrKey(..)")
    }
}

/// Déchiffre un flux AES-128-CTR au fil de l'eau
pub fn decrypt_ctr(inner: ByteStream, key: &CtrKey) -> ByteStream {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&key.nonce);
    let mut cipher = Aes128Ctr::new(&key.key.into(), &iv.into());

    inner
        .map(move |chunk| {
            chunk.map(|bytes| {
                let mut buf = bytes.to_vec();
                cipher.apply_keystream(&mut buf);
                Bytes::from(buf)
            })
        })
        .boxed()
}

/// État du déchiffrement Deezer
pub struct StripeDecryptor {
    key: Option<[u8; 16]>,
    buffer: Vec<u8>,
    block_index: u64,
    started: bool,
}

impl StripeDecryptor {
    /// `key = None` : flux en clair, seul le bourrage initial est retiré
    pub fn new(key: Option<[u8; 16]>) -> Self {
        Self {
            key,
            buffer: Vec::with_capacity(DEEZER_BLOCK * 2),
            block_index: 0,
            started: false,
        }
    }

    fn decrypt_block(key: &[u8; 16], block: &mut [u8]) -> Result<()> {
        let cipher = BlowfishCbc::new_from_slices(key, &DEEZER_IV)
            .map_err(|e| StreamError::decryption(format!("invalid Blowfish key: {}", e)))?;
        cipher
            .decrypt_padded_mut::<NoPadding>(block)
            .map_err(|e| StreamError::decryption(format!("Blowfish block rejected: {}", e)))?;
        Ok(())
    }

    /// Traite un morceau ; retourne les blocs complets disponibles
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        let Some(key) = self.key else {
            return Ok(self.strip_leading_zeros(chunk.to_vec()));
        };

        self.buffer.extend_from_slice(chunk);
        let complete = self.buffer.len() - self.buffer.len() % DEEZER_BLOCK;
        let mut out: Vec<u8> = self.buffer.drain(..complete).collect();
        for block in out.chunks_mut(DEEZER_BLOCK) {
            if self.block_index % 3 == 0 {
                Self::decrypt_block(&key, block)?;
            }
            self.block_index += 1;
        }
        Ok(self.strip_leading_zeros(out))
    }

    /// Fin de flux : le bloc partiel restant est rendu tel quel
    pub fn finish(&mut self) -> Vec<u8> {
        let rest = std::mem::take(&mut self.buffer);
        self.strip_leading_zeros(rest)
    }

    fn strip_leading_zeros(&mut self, mut data: Vec<u8>) -> Vec<u8> {
        if self.started {
            return data;
        }
        match data.iter().position(|b| *b != 0) {
            Some(first) => {
                self.started = true;
                data.drain(..first);
                data
            }
            None => Vec::new(),
        }
    }
}

/// Applique un [`StripeDecryptor`] à un flux
pub fn decrypt_stripes(inner: ByteStream, key: Option<[u8; 16]>) -> ByteStream {
    let decryptor = StripeDecryptor::new(key);
    futures::stream::unfold(
        (inner, decryptor, false),
        |(mut inner, mut decryptor, done)| async move {
            if done {
                return None;
            }
            loop {
                match inner.next().await {
                    Some(Ok(chunk)) => match decryptor.push(&chunk) {
                        Ok(out) if out.is_empty() => continue,
                        Ok(out) => return Some((Ok(Bytes::from(out)), (inner, decryptor, false))),
                        Err(e) => return Some((Err(e), (inner, decryptor, true))),
                    },
                    Some(Err(e)) => return Some((Err(e), (inner, decryptor, true))),
                    None => {
                        let rest = decryptor.finish();
                        if rest.is_empty() {
                            return None;
                        }
                        return Some((Ok(Bytes::from(rest)), (inner, decryptor, true)));
                    }
                }
            }
        },
    )
    .boxed()
}
