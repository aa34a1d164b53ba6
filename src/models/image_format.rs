//! Image format detection from magic bytes.

/// Enough about an encoded image to name and label it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFormat {
    pub extension: &'static str,
    pub mime: &'static str,
}

pub const PNG: ImageFormat = ImageFormat {
    extension: "png",
    mime: "image/png",
};

const JPEG: ImageFormat = ImageFormat {
    extension: "jpg",
    mime: "image/jpeg",
};

const GIF: ImageFormat = ImageFormat {
    extension: "gif",
    mime: "image/gif",
};

const WEBP: ImageFormat = ImageFormat {
    extension: "webp",
    mime: "image/webp",
};

const UNKNOWN: ImageFormat = ImageFormat {
    extension: "bin",
    mime: "application/octet-stream",
};

impl ImageFormat {
    pub fn sniff(bytes: &[u8]) -> Self {
        match bytes {
            [0x89, b'P', b'N', b'G', ..] => PNG,
            [0xFF, 0xD8, 0xFF, ..] => JPEG,
            [b'G', b'I', b'F', b'8', ..] => GIF,
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => WEBP,
            _ => UNKNOWN,
        }
    }
}
