use std::io::Cursor;

use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageEncoder, ImageReader, RgbaImage};
use puzzlehunt_core::{Board, GridDims, PieceRect, Rotation};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("image encode failed: {0}")]
    Encode(String),
    #[error("invalid image dimensions")]
    Dimensions,
    #[error("piece {piece} is outside a {rows}x{cols} grid")]
    Piece { piece: u32, rows: u32, cols: u32 },
}

pub const UPLOAD_MAX_DIM_DEFAULT: u32 = 1600;

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Longest side kept for uploads; `None` keeps the original size.
    pub max_dim: Option<u32>,
    pub filter: FilterType,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_dim: Some(UPLOAD_MAX_DIM_DEFAULT),
            filter: FilterType::Lanczos3,
        }
    }
}

/// Upload ready to be stored as an image source.
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub struct ImagePipeline {
    config: PipelineConfig,
}

impl ImagePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Decode, honour EXIF orientation, downscale to `max_dim` and re-encode
    /// as PNG.
    pub fn prepare_upload(&self, bytes: &[u8]) -> Result<PreparedUpload, PipelineError> {
        let rgba = decode_rgba8(bytes)?;
        let rgba = resize_to_max_dim(rgba, self.config.max_dim, self.config.filter);
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(PipelineError::Dimensions);
        }
        Ok(PreparedUpload {
            png: encode_png(&rgba)?,
            width,
            height,
        })
    }
}

pub fn decode_rgba8(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| PipelineError::Decode(err.to_string()))?;
    let mut decoder = reader
        .into_decoder()
        .map_err(|err| PipelineError::Decode(err.to_string()))?;
    let orientation = decoder
        .orientation()
        .map_err(|err| PipelineError::Decode(err.to_string()))?;
    let mut image =
        DynamicImage::from_decoder(decoder).map_err(|err| PipelineError::Decode(err.to_string()))?;
    image.apply_orientation(orientation);
    let rgba = image.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(PipelineError::Dimensions);
    }
    Ok(rgba)
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, PipelineError> {
    let (width, height) = image.dimensions();
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
        .map_err(|err| PipelineError::Encode(err.to_string()))?;
    Ok(out)
}

fn resize_to_max_dim(rgba: RgbaImage, max_dim: Option<u32>, filter: FilterType) -> RgbaImage {
    let Some(max_dim) = max_dim.filter(|max_dim| *max_dim > 0) else {
        return rgba;
    };
    let (width, height) = rgba.dimensions();
    let max_axis = width.max(height);
    if max_axis <= max_dim {
        return rgba;
    }
    let scale = max_dim as f32 / max_axis as f32;
    let next_width = ((width as f32) * scale).round().max(1.0) as u32;
    let next_height = ((height as f32) * scale).round().max(1.0) as u32;
    image::imageops::resize(&rgba, next_width, next_height, filter)
}

fn piece_rect(image: &RgbaImage, dims: GridDims, piece: u32) -> Result<PieceRect, PipelineError> {
    let rect = dims
        .piece_rect(piece as usize, image.width(), image.height())
        .ok_or(PipelineError::Piece {
            piece,
            rows: dims.rows,
            cols: dims.cols,
        })?;
    if rect.width == 0 || rect.height == 0 {
        return Err(PipelineError::Dimensions);
    }
    Ok(rect)
}

/// Pixels of one piece, upright.
pub fn crop_piece(image: &RgbaImage, dims: GridDims, piece: u32) -> Result<RgbaImage, PipelineError> {
    let rect = piece_rect(image, dims, piece)?;
    Ok(image::imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image())
}

/// Every piece in index order.
pub fn slice(image: &RgbaImage, dims: GridDims) -> Result<Vec<RgbaImage>, PipelineError> {
    (0..dims.total() as u32)
        .map(|piece| crop_piece(image, dims, piece))
        .collect()
}

fn rotate(image: RgbaImage, rotation: Rotation) -> RgbaImage {
    match rotation.quarter_turns() {
        1 => image::imageops::rotate90(&image),
        2 => image::imageops::rotate180(&image),
        3 => image::imageops::rotate270(&image),
        _ => image,
    }
}

/// Draws the board the way the player sees it: each slot shows its piece at
/// its rotation, squeezed into the slot's box. Empty slots stay transparent.
pub fn render_board(image: &RgbaImage, board: &Board) -> Result<RgbaImage, PipelineError> {
    let dims = board.dims();
    let (width, height) = image.dimensions();
    let mut canvas = RgbaImage::new(width, height);
    for (index, slot) in board.slots().iter().enumerate() {
        let (Some(piece), Some(rotation)) = (slot.piece(), slot.rotation()) else {
            continue;
        };
        let target = piece_rect(image, dims, index as u32)?;
        let mut tile = rotate(crop_piece(image, dims, piece)?, rotation);
        if tile.dimensions() != (target.width, target.height) {
            tile = image::imageops::resize(&tile, target.width, target.height, FilterType::Triangle);
        }
        image::imageops::replace(&mut canvas, &tile, i64::from(target.x), i64::from(target.y));
    }
    Ok(canvas)
}

/// PNG of the board rendered over the source bytes; used for publishing.
pub fn render_board_png(source: &[u8], board: &Board) -> Result<PreparedUpload, PipelineError> {
    let image = decode_rgba8(source)?;
    let rendered = render_board(&image, board)?;
    Ok(PreparedUpload {
        png: encode_png(&rendered)?,
        width: rendered.width(),
        height: rendered.height(),
    })
}
