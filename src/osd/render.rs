//! Software rendering of overlay frames

use anyhow::{Result, anyhow};
use tiny_skia::{
    Color, FillRule, GradientStop, Paint, PathBuilder, Pixmap, Point, RadialGradient, Rect,
    SpreadMode, Transform,
};

/// Fill an ARGB8888 shm canvas with either the scare frame or nothing at all
pub fn render_frame(canvas: &mut [u8], width: u32, height: u32, visible: bool) -> Result<()> {
    let expected = width as usize * height as usize * 4;
    if canvas.len() < expected {
        return Err(anyhow!(
            "Canvas too small: {} bytes for {}x{}",
            canvas.len(),
            width,
            height
        ));
    }

    if !visible {
        canvas[..expected].fill(0);
        return Ok(());
    }

    let mut pixmap =
        Pixmap::new(width, height).ok_or_else(|| anyhow!("Failed to create pixmap"))?;
    paint_scare(&mut pixmap);

    // tiny-skia is premultiplied RGBA, wl_shm ARGB8888 is BGRA in memory
    for (dst, src) in canvas[..expected]
        .chunks_exact_mut(4)
        .zip(pixmap.data().chunks_exact(4))
    {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
        dst[3] = src[3];
    }
    Ok(())
}

fn paint_scare(pixmap: &mut Pixmap) {
    let width = pixmap.width() as f32;
    let height = pixmap.height() as f32;

    pixmap.fill(Color::from_rgba8(8, 0, 0, 240));

    let center = Point::from_xy(width / 2.0, height / 2.0);
    let glow = RadialGradient::new(
        center,
        center,
        width.max(height) * 0.6,
        vec![
            GradientStop::new(0.0, Color::from_rgba8(190, 0, 0, 255)),
            GradientStop::new(1.0, Color::from_rgba8(0, 0, 0, 0)),
        ],
        SpreadMode::Pad,
        Transform::identity(),
    );
    if let (Some(shader), Some(rect)) = (glow, Rect::from_xywh(0.0, 0.0, width, height)) {
        let paint = Paint {
            shader,
            ..Paint::default()
        };
        pixmap.fill_rect(rect, &paint, Transform::identity(), None);
    }

    let eye_radius = height * 0.05;
    let mut eyes = PathBuilder::new();
    eyes.push_circle(width * 0.4, height * 0.42, eye_radius);
    eyes.push_circle(width * 0.6, height * 0.42, eye_radius);
    if let Some(path) = eyes.finish() {
        let mut paint = Paint::default();
        paint.set_color_rgba8(255, 244, 214, 255);
        paint.anti_alias = true;
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
}
