//! The extended (VP8X) file header and the ALPH chunk.

use alloc::vec::Vec;

use super::api::DecodingError;
use super::lossless::LosslessDecoder;
use crate::slice_reader::SliceReader;

/// Contents of the VP8X chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct WebPExtendedInfo {
    pub(crate) alpha: bool,
    pub(crate) animation: bool,
    pub(crate) icc_profile: bool,
    pub(crate) exif_metadata: bool,
    pub(crate) xmp_metadata: bool,

    pub(crate) canvas_width: u32,
    pub(crate) canvas_height: u32,
}

/// Reads the 10-byte VP8X payload. Reserved bits are ignored.
pub(crate) fn read_extended_header(
    r: &mut SliceReader<'_>,
) -> Result<WebPExtendedInfo, DecodingError> {
    let chunk_flags = r.read_u8()?;
    r.skip(3)?;

    // Flags from the most significant bit: 2 reserved, ICC, alpha, EXIF,
    // XMP, animation, 1 reserved.
    let info = WebPExtendedInfo {
        icc_profile: chunk_flags & 0b0010_0000 != 0,
        alpha: chunk_flags & 0b0001_0000 != 0,
        exif_metadata: chunk_flags & 0b0000_1000 != 0,
        xmp_metadata: chunk_flags & 0b0000_0100 != 0,
        animation: chunk_flags & 0b0000_0010 != 0,

        canvas_width: r.read_u24_le()? + 1,
        canvas_height: r.read_u24_le()? + 1,
    };

    log::debug!("VP8X header: {info:?}");

    Ok(info)
}

/// Spatial predictor applied to the alpha plane before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FilteringMethod {
    None,
    Horizontal,
    Vertical,
    Gradient,
}

impl FilteringMethod {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::None,
            1 => Self::Horizontal,
            2 => Self::Vertical,
            _ => Self::Gradient,
        }
    }
}

/// Decodes an ALPH chunk payload into one alpha byte per pixel, row major.
pub(crate) fn read_alpha_chunk(
    data: &[u8],
    width: u16,
    height: u16,
) -> Result<Vec<u8>, DecodingError> {
    let (&header, payload) = data
        .split_first()
        .ok_or(DecodingError::AlphaChunkSizeMismatch)?;

    let preprocessing = (header >> 4) & 0b11;
    let filtering_method = FilteringMethod::from_bits(header >> 2);
    let compression = header & 0b11;

    // Level reduction (1) needs no work when decoding.
    if preprocessing > 1 {
        return Err(DecodingError::InvalidAlphaPreprocessing);
    }

    log::debug!(
        "ALPH chunk: compression {compression}, filter {filtering_method:?}, preprocessing {preprocessing}"
    );

    let size = usize::from(width) * usize::from(height);
    let mut alpha = match compression {
        0 => {
            let raw = payload
                .get(..size)
                .ok_or(DecodingError::AlphaChunkSizeMismatch)?;
            raw.to_vec()
        }
        1 => {
            // The alpha values are stored in the green channel.
            let mut decoder = LosslessDecoder::new(payload);
            decoder
                .decode_argb(u32::from(width), u32::from(height), true)?
                .into_iter()
                .map(|argb| (argb >> 8) as u8)
                .collect()
        }
        _ => return Err(DecodingError::InvalidCompressionMethod),
    };

    unfilter(&mut alpha, usize::from(width), filtering_method);

    Ok(alpha)
}

/// Reverses the alpha filter in place. Prediction reads already
/// reconstructed values.
fn unfilter(plane: &mut [u8], width: usize, method: FilteringMethod) {
    if method == FilteringMethod::None || width == 0 {
        return;
    }

    // The first row predicts from the left, starting from zero.
    for x in 1..width.min(plane.len()) {
        plane[x] = plane[x].wrapping_add(plane[x - 1]);
    }

    for y in 1..plane.len() / width {
        let (done, rest) = plane.split_at_mut(y * width);
        let above = &done[(y - 1) * width..];
        let row = &mut rest[..width];

        // The first column predicts from above.
        row[0] = row[0].wrapping_add(above[0]);
        for x in 1..width {
            let predictor = match method {
                FilteringMethod::Horizontal => row[x - 1],
                FilteringMethod::Vertical => above[x],
                FilteringMethod::Gradient => {
                    let gradient =
                        i16::from(row[x - 1]) + i16::from(above[x]) - i16::from(above[x - 1]);
                    gradient.clamp(0, 255) as u8
                }
                FilteringMethod::None => 0,
            };
            row[x] = row[x].wrapping_add(predictor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::bit_reader::tests::BitWriter;
    use alloc::vec;

    #[test]
    fn extended_header_fields() {
        // alpha + ICC + animation, canvas 300 x 2
        let data = [0b0011_0010, 0, 0, 0, 0x2b, 0x01, 0x00, 0x01, 0x00, 0x00];
        let info = read_extended_header(&mut SliceReader::new(&data)).unwrap();
        assert_eq!(
            info,
            WebPExtendedInfo {
                alpha: true,
                animation: true,
                icc_profile: true,
                exif_metadata: false,
                xmp_metadata: false,
                canvas_width: 300,
                canvas_height: 2,
            }
        );

        assert!(read_extended_header(&mut SliceReader::new(&data[..9])).is_err());
    }

    #[test]
    fn raw_alpha_unfiltered() {
        let chunk = [0x00, 1, 2, 3, 4, 5, 6];
        assert_eq!(read_alpha_chunk(&chunk, 3, 2).unwrap(), vec![1, 2, 3, 4, 5, 6]);

        // Extra trailing bytes are allowed, missing ones are not.
        assert!(read_alpha_chunk(&[0x00, 1, 2, 3, 4, 5, 6, 7], 3, 2).is_ok());
        assert!(matches!(
            read_alpha_chunk(&chunk[..6], 3, 2),
            Err(DecodingError::AlphaChunkSizeMismatch)
        ));
        assert!(matches!(
            read_alpha_chunk(&[], 3, 2),
            Err(DecodingError::AlphaChunkSizeMismatch)
        ));
    }

    #[test]
    fn bad_alpha_headers() {
        assert!(matches!(
            read_alpha_chunk(&[0x20, 0], 1, 1),
            Err(DecodingError::InvalidAlphaPreprocessing)
        ));
        assert!(matches!(
            read_alpha_chunk(&[0x02, 0], 1, 1),
            Err(DecodingError::InvalidCompressionMethod)
        ));
        // Level reduction is accepted.
        assert_eq!(read_alpha_chunk(&[0x10, 9], 1, 1).unwrap(), vec![9]);
    }

    #[test]
    fn horizontal_filter() {
        let chunk = [0b0100, 10, 1, 1, 5, 2, 2];
        assert_eq!(
            read_alpha_chunk(&chunk, 3, 2).unwrap(),
            vec![10, 11, 12, 15, 17, 19]
        );
    }

    #[test]
    fn vertical_filter() {
        let chunk = [0b1000, 10, 1, 1, 5, 2, 2];
        assert_eq!(
            read_alpha_chunk(&chunk, 3, 2).unwrap(),
            vec![10, 11, 12, 15, 13, 14]
        );
    }

    #[test]
    fn gradient_filter_clamps() {
        // Second row predictions: above-left 200, above 10, left 250 -> 60.
        let mut plane = vec![200, 66, 50, 0];
        unfilter(&mut plane, 2, FilteringMethod::Gradient);
        // row 0: 200, 200 + 66 = 10 (wrapped); row 1: 200 + 50 = 250, 60 + 0
        assert_eq!(plane, vec![200, 10, 250, 60]);

        let mut plane = vec![0, 255, 255, 3];
        unfilter(&mut plane, 2, FilteringMethod::Gradient);
        // row 1 x 1: left 255 + above 255 - above-left 0 clamps to 255
        assert_eq!(plane, vec![0, 255, 255, 2]);
    }

    #[test]
    fn filters_wrap_around() {
        let mut plane = vec![250, 10];
        unfilter(&mut plane, 2, FilteringMethod::Horizontal);
        assert_eq!(plane, vec![250, 4]);
    }

    #[test]
    fn lossless_alpha_uses_green() {
        // Headerless VP8L stream: no transforms, no color cache, one prefix
        // group of single-symbol codes so every pixel is green 0x7f, alpha 0.
        let mut w = BitWriter::default();
        w.write(0, 1); // no transform
        w.write(0, 1); // no color cache
        w.write(0, 1); // no meta prefix codes
        let simple_code = |w: &mut BitWriter, symbol: u32| {
            w.write(1, 1); // simple
            w.write(0, 1); // one symbol
            w.write(1, 1); // 8-bit symbol
            w.write(symbol, 8);
        };
        simple_code(&mut w, 0x7f); // green
        simple_code(&mut w, 0); // red
        simple_code(&mut w, 0); // blue
        simple_code(&mut w, 0); // alpha
        simple_code(&mut w, 0); // distance
        let mut chunk = vec![0x01];
        chunk.extend(w.finish());

        assert_eq!(read_alpha_chunk(&chunk, 2, 2).unwrap(), vec![0x7f; 4]);
    }
}
