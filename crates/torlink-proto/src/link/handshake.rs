//! The client side of the link handshake.
//!
//! A new link speaks VERSIONS first, in the old 3-byte-header framing;
//! after both sides have picked a version the relay sends its CERTS,
//! AUTH_CHALLENGE and NETINFO cells, and the client finishes with a
//! NETINFO of its own.

use arrayref::array_ref;
use bytes::BytesMut;
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use log::debug;

use std::net::IpAddr;
use std::time::SystemTime;

use torlink_cell::cell::codec::CellCodec;
use torlink_cell::cell::msg::{self, Body, CellMsg, LINK_VERSIONS};
use torlink_cell::cell::{Cell, CellCmd};
use torlink_cell::wire::Reader;

use crate::{Error, Result};

use super::{LinkSocket, Reactor};

/// A raw client link on which nothing has been done.
pub struct OutboundLinkHandshake<T: AsyncRead + AsyncWrite + Unpin> {
    /// The TLS byte stream to the relay.
    tls: T,
}

/// A client link on which versions have been negotiated and the
/// relay's handshake cells have been read.
///
/// The certificate chain in the relay's CERTS cell is not validated:
/// the ntor handshake against the relay's published keys is this
/// implementation's trust anchor, not TLS PKI.
pub struct UnverifiedLink<T: AsyncRead + AsyncWrite + Unpin> {
    /// The negotiated link protocol version.
    link_protocol: u16,
    /// The TLS byte stream.
    tls: T,
    /// Bytes read past the relay's NETINFO, if any.
    readbuf: BytesMut,
    /// The relay's certificate chain, unvalidated.
    certs_cell: msg::Certs,
    /// The relay's NETINFO.
    netinfo_cell: msg::Netinfo,
}

impl<T: AsyncRead + AsyncWrite + Unpin> OutboundLinkHandshake<T> {
    /// Construct a new OutboundLinkHandshake.
    pub(crate) fn new(tls: T) -> Self {
        Self { tls }
    }

    /// Negotiate a link protocol version with the relay, and read the
    /// relay's handshake cells.
    pub async fn connect(mut self) -> Result<UnverifiedLink<T>> {
        // Send our versions cell.
        {
            let my_versions = msg::Versions::new(LINK_VERSIONS);
            self.tls.write_all(&my_versions.encode_for_handshake()).await?;
            self.tls.flush().await?;
        }

        // Get the relay's versions cell.  It is framed with the old
        // 2-byte circuit id no matter what we end up negotiating.
        let their_versions: msg::Versions = {
            let mut hdr = [0_u8; 5];
            self.tls.read_exact(&mut hdr).await?;
            if hdr[0..3] != [0, 0, CellCmd::Versions.value()] {
                return Err(Error::LinkProto("Doesn't seem to be a tor relay".into()));
            }
            let msglen = u16::from_be_bytes(*array_ref![hdr, 3, 2]);
            let mut body = vec![0; msglen as usize];
            self.tls.read_exact(&mut body).await?;
            let mut reader = Reader::from_slice(&body);
            msg::Versions::decode_from_reader(&mut reader)?
        };

        // Determine which link protocol we negotiated.
        let link_protocol = their_versions
            .best_shared_link_protocol(LINK_VERSIONS)
            .ok_or(Error::NoVersion)?;
        debug!("negotiated link protocol {}", link_protocol);

        // From here on, cells use the negotiated header width.  Read
        // until we have the relay's netinfo, keeping any bytes that
        // arrive after it.
        let mut codec = CellCodec::new(link_protocol);
        let mut readbuf = BytesMut::new();
        let mut chunk = vec![0_u8; 2048];

        let mut certs: Option<msg::Certs> = None;
        let mut netinfo: Option<msg::Netinfo> = None;
        let mut seen_authchallenge = false;

        'read: loop {
            while let Some(cell) = codec.decode_cell(&mut readbuf)? {
                let (_, m) = cell.into_circid_and_msg();
                match m {
                    CellMsg::Padding(_) | CellMsg::Vpadding(_) => (),
                    // Unrecognized cells get ignored.
                    CellMsg::Unrecognized(_) => (),
                    // Clients don't authenticate, so the challenge
                    // only gets counted.
                    CellMsg::AuthChallenge(_) => {
                        if seen_authchallenge {
                            return Err(Error::LinkProto("Duplicate authchallenge cell".into()));
                        }
                        seen_authchallenge = true;
                    }
                    CellMsg::Certs(c) => {
                        if certs.is_some() {
                            return Err(Error::LinkProto("Duplicate certs cell".into()));
                        }
                        certs = Some(c);
                    }
                    CellMsg::Netinfo(n) => {
                        if netinfo.is_some() {
                            return Err(Error::LinkProto("Duplicate netinfo cell".into()));
                        }
                        netinfo = Some(n);
                        break 'read;
                    }
                    // No other cell types are allowed yet.
                    m => {
                        return Err(Error::LinkProto(format!(
                            "Unexpected cell type {} during handshake",
                            m.cmd()
                        )))
                    }
                }
            }
            let n = self.tls.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::LinkProto("Link closed during handshake".into()));
            }
            readbuf.extend_from_slice(&chunk[..n]);
        }

        match (certs, netinfo) {
            (Some(certs_cell), Some(netinfo_cell)) => {
                if let Some(a) = netinfo_cell.other_addr() {
                    debug!("relay says our address is {}", a);
                }
                Ok(UnverifiedLink {
                    link_protocol,
                    tls: self.tls,
                    readbuf,
                    certs_cell,
                    netinfo_cell,
                })
            }
            (None, _) => Err(Error::LinkProto("Missing certs cell".into())),
            (_, None) => Err(Error::LinkProto("Missing netinfo cell".into())),
        }
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> UnverifiedLink<T> {
    /// Return the address the relay believes we connected from, if it
    /// sent one we could parse.
    pub fn reported_addr(&self) -> Option<IpAddr> {
        self.netinfo_cell.other_addr()
    }

    /// Return the certificate chain the relay presented.
    ///
    /// Provided for callers that want to inspect it; nothing in this
    /// crate checks its contents.
    pub fn peer_certs(&self) -> &msg::Certs {
        &self.certs_cell
    }

    /// Send our NETINFO to finish the handshake, and build the open
    /// link socket and its reactor.
    ///
    /// `relay_addr` is the address we dialed; it goes into our
    /// NETINFO's other-address field.
    pub async fn finish(mut self, relay_addr: IpAddr) -> Result<(LinkSocket<T>, Reactor<T>)> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let netinfo = msg::Netinfo::for_client(timestamp, relay_addr);

        let mut codec = CellCodec::new(self.link_protocol);
        let mut out = BytesMut::new();
        codec.write_cell(Cell::new(0.into(), netinfo), &mut out)?;
        self.tls.write_all(&out).await?;
        self.tls.flush().await?;

        Ok(LinkSocket::new(
            self.link_protocol,
            self.tls,
            self.readbuf,
        ))
    }
}
