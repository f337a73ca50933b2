//! DER and BER builders for envelope tests: a `signedData` `ContentInfo`
//! with no signers, in the encodings signing tools produce.

#![allow(dead_code)]

pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes: Vec<u8> = len
            .to_be_bytes()
            .iter()
            .copied()
            .skip_while(|&b| b == 0)
            .collect();
        out.push(0x80 | bytes.len() as u8);
        out.extend(bytes);
    }
    out.extend_from_slice(content);
    out
}

/// Indefinite-length encoding of a constructed value.
pub fn indefinite(tag: u8, parts: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![tag, 0x80];
    for part in parts {
        out.extend_from_slice(part);
    }
    out.extend([0x00, 0x00]);
    out
}

pub const OID_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01];
pub const OID_SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];
pub const OID_ENVELOPED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x03];

/// `ContentInfo { signedData, SignedData { eContent: content } }` in DER.
/// `None` builds a detached signature.
pub fn signed_data(content: Option<&[u8]>) -> Vec<u8> {
    let mut encap = tlv(0x06, OID_DATA);
    if let Some(c) = content {
        encap.extend(tlv(0xA0, &tlv(0x04, c)));
    }
    let mut sd = tlv(0x02, &[0x01]); // version 1
    sd.extend(tlv(0x31, &[])); // digestAlgorithms
    sd.extend(tlv(0x30, &encap));
    sd.extend(tlv(0x31, &[])); // signerInfos
    let mut ci = tlv(0x06, OID_SIGNED_DATA);
    ci.extend(tlv(0xA0, &tlv(0x30, &sd)));
    tlv(0x30, &ci)
}

/// The same envelope in BER: indefinite lengths throughout and `eContent`
/// as a constructed OCTET STRING of `segment`-byte pieces.
pub fn signed_data_ber(content: &[u8], segment: usize) -> Vec<u8> {
    let pieces: Vec<Vec<u8>> = content.chunks(segment).map(|c| tlv(0x04, c)).collect();
    let econtent = indefinite(0xA0, &[indefinite(0x24, &pieces)]);
    let encap = indefinite(0x30, &[tlv(0x06, OID_DATA), econtent]);
    let sd = indefinite(
        0x30,
        &[tlv(0x02, &[0x01]), tlv(0x31, &[]), encap, tlv(0x31, &[])],
    );
    indefinite(0x30, &[tlv(0x06, OID_SIGNED_DATA), indefinite(0xA0, &[sd])])
}

/// A `ContentInfo` of type envelopedData with an opaque body.
pub fn enveloped_data() -> Vec<u8> {
    let mut ci = tlv(0x06, OID_ENVELOPED_DATA);
    ci.extend(tlv(0xA0, &tlv(0x30, &tlv(0x02, &[0x00]))));
    tlv(0x30, &ci)
}
