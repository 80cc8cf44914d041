use std::borrow::Cow;

use encoding_rs::Encoding;
use tracing::debug;

use crate::domain::CCError;

pub const DEFAULT_ENCODING: &str = "latin_1";

/// Encoding names accepted for import and export, after normalisation.
pub const SUPPORTED_ENCODINGS: &[&str] = &[
    "ascii",
    "latin_1",
    "utf_8",
    "utf_8_sig",
    "utf_16",
    "utf_16_le",
    "utf_16_be",
    "cp866",
    "cp874",
    "cp1250",
    "cp1251",
    "cp1252",
    "cp1253",
    "cp1254",
    "cp1255",
    "cp1256",
    "cp1257",
    "cp1258",
    "iso8859_2",
    "iso8859_3",
    "iso8859_4",
    "iso8859_5",
    "iso8859_6",
    "iso8859_7",
    "iso8859_8",
    "iso8859_10",
    "iso8859_13",
    "iso8859_14",
    "iso8859_15",
    "iso8859_16",
    "koi8_r",
    "koi8_u",
    "mac_roman",
    "mac_cyrillic",
    "big5",
    "euc_jp",
    "euc_kr",
    "gb2312",
    "gbk",
    "gb18030",
    "shift_jis",
    "iso2022_jp",
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Codec {
    Ascii,
    Latin1,
    Utf8 { bom: bool },
    Utf16,
    Utf16Le,
    Utf16Be,
    Legacy(&'static Encoding),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileEncoding {
    name: &'static str,
    codec: Codec,
}

impl Default for FileEncoding {
    fn default() -> Self {
        FileEncoding {
            name: DEFAULT_ENCODING,
            codec: Codec::Latin1,
        }
    }
}

impl FileEncoding {
    /// Resolves a user supplied name. Case and `-`/`_` are normalised, unknown
    /// names fall back to latin_1.
    pub fn resolve(name: &str) -> Self {
        let normalized = name.trim().to_lowercase().replace('-', "_");
        match SUPPORTED_ENCODINGS
            .iter()
            .find(|n| **n == normalized)
            .and_then(|n| Self::codec_for(n).map(|codec| (*n, codec)))
        {
            Some((name, codec)) => FileEncoding { name, codec },
            None => {
                debug!("Unknown encoding \"{name}\", falling back to {DEFAULT_ENCODING}");
                FileEncoding::default()
            }
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn codec_for(name: &str) -> Option<Codec> {
        let codec = match name {
            "ascii" => Codec::Ascii,
            "latin_1" => Codec::Latin1,
            "utf_8" => Codec::Utf8 { bom: false },
            "utf_8_sig" => Codec::Utf8 { bom: true },
            "utf_16" => Codec::Utf16,
            "utf_16_le" => Codec::Utf16Le,
            "utf_16_be" => Codec::Utf16Be,
            "cp866" => Codec::Legacy(encoding_rs::IBM866),
            "cp874" => Codec::Legacy(encoding_rs::WINDOWS_874),
            "cp1250" => Codec::Legacy(encoding_rs::WINDOWS_1250),
            "cp1251" => Codec::Legacy(encoding_rs::WINDOWS_1251),
            "cp1252" => Codec::Legacy(encoding_rs::WINDOWS_1252),
            "cp1253" => Codec::Legacy(encoding_rs::WINDOWS_1253),
            "cp1254" => Codec::Legacy(encoding_rs::WINDOWS_1254),
            "cp1255" => Codec::Legacy(encoding_rs::WINDOWS_1255),
            "cp1256" => Codec::Legacy(encoding_rs::WINDOWS_1256),
            "cp1257" => Codec::Legacy(encoding_rs::WINDOWS_1257),
            "cp1258" => Codec::Legacy(encoding_rs::WINDOWS_1258),
            "iso8859_2" => Codec::Legacy(encoding_rs::ISO_8859_2),
            "iso8859_3" => Codec::Legacy(encoding_rs::ISO_8859_3),
            "iso8859_4" => Codec::Legacy(encoding_rs::ISO_8859_4),
            "iso8859_5" => Codec::Legacy(encoding_rs::ISO_8859_5),
            "iso8859_6" => Codec::Legacy(encoding_rs::ISO_8859_6),
            "iso8859_7" => Codec::Legacy(encoding_rs::ISO_8859_7),
            "iso8859_8" => Codec::Legacy(encoding_rs::ISO_8859_8),
            "iso8859_10" => Codec::Legacy(encoding_rs::ISO_8859_10),
            "iso8859_13" => Codec::Legacy(encoding_rs::ISO_8859_13),
            "iso8859_14" => Codec::Legacy(encoding_rs::ISO_8859_14),
            "iso8859_15" => Codec::Legacy(encoding_rs::ISO_8859_15),
            "iso8859_16" => Codec::Legacy(encoding_rs::ISO_8859_16),
            "koi8_r" => Codec::Legacy(encoding_rs::KOI8_R),
            "koi8_u" => Codec::Legacy(encoding_rs::KOI8_U),
            "mac_roman" => Codec::Legacy(encoding_rs::MACINTOSH),
            "mac_cyrillic" => Codec::Legacy(encoding_rs::X_MAC_CYRILLIC),
            "big5" => Codec::Legacy(encoding_rs::BIG5),
            "euc_jp" => Codec::Legacy(encoding_rs::EUC_JP),
            "euc_kr" => Codec::Legacy(encoding_rs::EUC_KR),
            "gb2312" | "gbk" => Codec::Legacy(encoding_rs::GBK),
            "gb18030" => Codec::Legacy(encoding_rs::GB18030),
            "shift_jis" => Codec::Legacy(encoding_rs::SHIFT_JIS),
            "iso2022_jp" => Codec::Legacy(encoding_rs::ISO_2022_JP),
            _ => return None,
        };
        Some(codec)
    }

    /// Strict decode, any malformed sequence is an error.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>, CCError> {
        let err = || CCError::Decode {
            encoding: self.name,
        };
        match self.codec {
            Codec::Ascii => {
                if !bytes.is_ascii() {
                    return Err(err());
                }
                std::str::from_utf8(bytes).map(Cow::Borrowed).map_err(|_| err())
            }
            Codec::Latin1 => Ok(encoding_rs::mem::decode_latin1(bytes)),
            Codec::Utf8 { bom } => {
                let bytes = match bytes.strip_prefix(b"\xEF\xBB\xBF") {
                    Some(rest) if bom => rest,
                    _ => bytes,
                };
                std::str::from_utf8(bytes).map(Cow::Borrowed).map_err(|_| err())
            }
            Codec::Utf16 => {
                let (encoding, rest) = match Encoding::for_bom(bytes) {
                    Some((enc, len))
                        if enc == encoding_rs::UTF_16LE || enc == encoding_rs::UTF_16BE =>
                    {
                        (enc, &bytes[len..])
                    }
                    _ => (encoding_rs::UTF_16LE, bytes),
                };
                encoding
                    .decode_without_bom_handling_and_without_replacement(rest)
                    .ok_or_else(err)
            }
            Codec::Utf16Le => encoding_rs::UTF_16LE
                .decode_without_bom_handling_and_without_replacement(bytes)
                .ok_or_else(err),
            Codec::Utf16Be => encoding_rs::UTF_16BE
                .decode_without_bom_handling_and_without_replacement(bytes)
                .ok_or_else(err),
            Codec::Legacy(encoding) => encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .ok_or_else(err),
        }
    }

    /// Strict encode, characters the encoding can not represent are an error.
    pub fn encode<'a>(&self, text: &'a str) -> Result<Cow<'a, [u8]>, CCError> {
        let err = || CCError::Encode {
            encoding: self.name,
        };
        match self.codec {
            Codec::Ascii => {
                if !text.is_ascii() {
                    return Err(err());
                }
                Ok(Cow::Borrowed(text.as_bytes()))
            }
            Codec::Latin1 => {
                if !encoding_rs::mem::is_str_latin1(text) {
                    return Err(err());
                }
                Ok(encoding_rs::mem::encode_latin1_lossy(text))
            }
            Codec::Utf8 { bom: false } => Ok(Cow::Borrowed(text.as_bytes())),
            Codec::Utf8 { bom: true } => {
                let mut out = Vec::with_capacity(text.len() + 3);
                out.extend_from_slice(b"\xEF\xBB\xBF");
                out.extend_from_slice(text.as_bytes());
                Ok(Cow::Owned(out))
            }
            Codec::Utf16 => {
                let mut out = vec![0xFF, 0xFE];
                out.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
                Ok(Cow::Owned(out))
            }
            Codec::Utf16Le => Ok(Cow::Owned(
                text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            )),
            Codec::Utf16Be => Ok(Cow::Owned(
                text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            )),
            Codec::Legacy(encoding) => {
                let (bytes, _, had_errors) = encoding.encode(text);
                if had_errors {
                    return Err(err());
                }
                Ok(bytes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_normalised() {
        assert_eq!(FileEncoding::resolve("UTF-8").name(), "utf_8");
        assert_eq!(FileEncoding::resolve("Latin-1").name(), "latin_1");
        assert_eq!(FileEncoding::resolve(" cp1252 ").name(), "cp1252");
    }

    #[test]
    fn unknown_names_fall_back_to_latin_1() {
        assert_eq!(FileEncoding::resolve("klingon").name(), DEFAULT_ENCODING);
        assert_eq!(FileEncoding::resolve("").name(), DEFAULT_ENCODING);
    }

    #[test]
    fn latin_1_covers_all_bytes() {
        let enc = FileEncoding::resolve("latin_1");
        let text = enc.decode(b"caf\xe9;\x80").unwrap();
        assert_eq!(text, "caf\u{e9};\u{80}");
        assert_eq!(&*enc.encode(&text).unwrap(), b"caf\xe9;\x80");
        assert!(enc.encode("\u{20ac}").is_err());
    }

    #[test]
    fn utf_8_is_strict() {
        let enc = FileEncoding::resolve("utf_8");
        assert!(matches!(
            enc.decode(b"caf\xe9"),
            Err(CCError::Decode { encoding: "utf_8" })
        ));
    }

    #[test]
    fn utf_8_sig_strips_and_writes_bom() {
        let enc = FileEncoding::resolve("utf-8-sig");
        assert_eq!(enc.decode(b"\xEF\xBB\xBFa,b").unwrap(), "a,b");
        assert_eq!(&*enc.encode("a").unwrap(), b"\xEF\xBB\xBFa");
    }

    #[test]
    fn utf_16_honours_bom() {
        let enc = FileEncoding::resolve("utf_16");
        let bytes = enc.encode("a;\u{e9}").unwrap().into_owned();
        assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
        assert_eq!(enc.decode(&bytes).unwrap(), "a;\u{e9}");
        assert_eq!(enc.decode(&[0xFE, 0xFF, 0x00, 0x61]).unwrap(), "a");
    }

    #[test]
    fn legacy_round_trip() {
        let enc = FileEncoding::resolve("cp1252");
        let bytes = enc.encode("\u{20ac}5").unwrap().into_owned();
        assert_eq!(bytes, b"\x805");
        assert_eq!(enc.decode(&bytes).unwrap(), "\u{20ac}5");
        assert!(enc.encode("\u{4e2d}").is_err());
    }
}
