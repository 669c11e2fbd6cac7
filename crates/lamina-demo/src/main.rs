mod runtime;

use std::cell::Cell;
use std::f32::consts::TAU;
use std::rc::Rc;

use anyhow::Result;
use log::info;

use lamina_engine::coords::{Rect, Vec2};
use lamina_engine::device::GpuInit;
use lamina_engine::gl::{PixelData, PixelFormat};
use lamina_engine::layer::{LayerId, Surface};
use lamina_engine::logging::{init_logging, LoggingConfig};
use lamina_engine::paint::Color;
use lamina_engine::time::FrameTime;
use lamina_engine::Graphics;

use runtime::{Runtime, RuntimeConfig, Scene};

const CHECKER: u32 = 64;

/// One of every layer kind: a tiled image, a CPU canvas, an offscreen
/// surface, and a clipped immediate layer inside a spinning group.
#[derive(Default)]
struct Showcase {
    spinner: Option<LayerId>,
}

fn checkerboard() -> Vec<u8> {
    let mut pixels = Vec::with_capacity((CHECKER * CHECKER * 4) as usize);
    for y in 0..CHECKER {
        for x in 0..CHECKER {
            let light = ((x / 8) + (y / 8)) % 2 == 0;
            let v = if light { 200 } else { 90 };
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    pixels
}

impl Scene for Showcase {
    fn build(&mut self, g: &mut Graphics) -> Result<()> {
        let root = g.root();

        let pixels = checkerboard();
        let data = PixelData::validated(&pixels, CHECKER, CHECKER, PixelFormat::Rgba8)?;
        let checker = g.context_mut().create_texture(CHECKER, CHECKER, true, true)?;
        g.context_mut().update_texture(&checker, &data);
        let tiled = g.create_image_layer(checker);
        if let Some(image) = g.layers_mut().image_mut(tiled) {
            image.set_width(Some(200.0)).set_height(Some(120.0)).set_repeat(true, true);
        }
        g.layers_mut().props_mut(tiled).set_translation(24.0, 24.0).set_alpha(0.9);
        g.layers_mut().add(root, tiled);

        let canvas_id = g.create_canvas_layer(200.0, 120.0)?;
        if let Some(layer) = g.layers_mut().canvas_mut(canvas_id) {
            let orange = Color::from_straight(1.0, 0.6, 0.1, 0.8);
            layer
                .canvas_mut()
                .clear(Color::from_straight(0.1, 0.2, 0.4, 1.0))
                .fill_rect(Rect::new(16.0, 16.0, 80.0, 40.0), orange)
                .stroke_line(Vec2::new(10.0, 110.0), Vec2::new(190.0, 10.0), 3.0, Color::WHITE);
        }
        g.layers_mut().props_mut(canvas_id).set_translation(248.0, 24.0);
        g.layers_mut().add(root, canvas_id);

        let surface_id = g.create_surface_layer(200.0, 120.0)?;
        g.draw_surface(surface_id, |s| {
            s.clear(Color::TRANSPARENT);
            s.set_fill_color(Color::from_straight(0.2, 0.8, 0.5, 1.0))
                .fill_rect(0.0, 0.0, 200.0, 120.0);
            s.set_fill_color(Color::BLACK);
            for i in 0..10 {
                let x = 10.0 + i as f32 * 20.0;
                s.draw_line(x, 10.0, 200.0 - x, 110.0, 2.0);
            }
        });
        g.layers_mut().props_mut(surface_id).set_translation(472.0, 24.0);
        g.layers_mut().add(root, surface_id);

        let spinner = g.create_group_layer();
        g.layers_mut()
            .props_mut(spinner)
            .set_translation(24.0, 180.0)
            .set_origin(100.0, 100.0);
        g.layers_mut().add(root, spinner);

        let phase = Rc::new(Cell::new(0.0f32));
        let hook_phase = Rc::clone(&phase);
        let immediate = g.create_clipped_immediate_layer(200.0, 200.0, move |s: &mut Surface<'_>| {
            draw_fan(s, phase.get());
        })?;
        g.layers_mut().set_update_hook(immediate, move |dt| {
            hook_phase.set((hook_phase.get() + dt) % TAU);
        });
        g.layers_mut().add(spinner, immediate);

        self.spinner = Some(spinner);
        info!("showcase built with {} layers", g.layers().len());
        Ok(())
    }

    fn frame(&mut self, g: &mut Graphics, time: FrameTime) {
        let Some(spinner) = self.spinner else { return };
        let props = g.layers_mut().props_mut(spinner);
        let rotation = props.rotation() + time.dt * 0.5;
        props.set_rotation(rotation % TAU);
    }
}

/// Pulsing triangle fan centered in a 200×200 area.
fn draw_fan(s: &mut Surface<'_>, phase: f32) {
    const SPOKES: u16 = 12;
    let center = Vec2::new(100.0, 100.0);
    let radius = 70.0 + 20.0 * phase.sin();

    let mut points = vec![center];
    let mut indices = Vec::with_capacity(SPOKES as usize * 3);
    for i in 0..=SPOKES {
        let angle = i as f32 / SPOKES as f32 * TAU;
        points.push(center + Vec2::new(angle.cos(), angle.sin()) * radius);
        if i > 0 {
            indices.extend_from_slice(&[0, i, i + 1]);
        }
    }

    s.set_fill_color(Color::from_straight(0.9, 0.3, 0.4, 1.0));
    s.fill_triangles(&points, &indices);
    s.set_alpha(0.5).set_fill_color(Color::WHITE).fill_rect(90.0, 0.0, 20.0, 200.0);
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = RuntimeConfig {
        title: "lamina showcase".to_string(),
        ..RuntimeConfig::default()
    };
    Runtime::run(config, GpuInit::default(), Showcase::default())
}
