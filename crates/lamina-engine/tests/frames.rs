//! Whole frames painted against the recording backend.

use std::cell::Cell;
use std::rc::Rc;

use lamina_engine::coords::{Rect, Vec2};
use lamina_engine::gl::recording::{Command, DrawRecord, RecordingBackend};
use lamina_engine::gl::{BackendCaps, PixelData, PixelFormat, Program, Scissor, Texture};
use lamina_engine::layer::Surface;
use lamina_engine::paint::Color;
use lamina_engine::{Capability, Graphics, GraphicsConfig, RenderError};

fn graphics() -> Graphics {
    graphics_on(RecordingBackend::new())
}

fn graphics_on(backend: RecordingBackend) -> Graphics {
    let mut g = Graphics::new(Box::new(backend), GraphicsConfig::default()).expect("graphics");
    g.update_layout(200.0, 100.0);
    g
}

fn recorder(g: &Graphics) -> &RecordingBackend {
    g.context().backend().as_any().downcast_ref().expect("recording backend")
}

fn texture(g: &mut Graphics, w: u32, h: u32) -> Texture {
    g.context_mut().create_texture(w, h, false, false).expect("texture")
}

fn quad_draws(g: &Graphics) -> Vec<&DrawRecord> {
    recorder(g).draws().iter().filter(|d| d.program == Some(Program::Quad)).collect()
}

fn approx(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
}

#[test]
fn nested_alpha_and_translation_reach_the_quad() {
    let mut g = graphics();
    let tex = texture(&mut g, 8, 4);
    let group = g.create_group_layer();
    let image = g.create_image_layer(tex.clone());
    let root = g.root();
    g.layers_mut().add(root, group);
    g.layers_mut().add(group, image);
    g.layers_mut().props_mut(group).set_alpha(0.5);
    g.layers_mut().props_mut(image).set_alpha(0.8).set_translation(10.0, 20.0);

    let stats = g.paint_frame(0.016);

    assert_eq!(stats.quads, 1);
    let draws = quad_draws(&g);
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].texture, Some(tex.id()));
    #[rustfmt::skip]
    let expected = [
        1.0, 0.0, 0.0, 1.0, 10.0, 20.0,
        0.0, 0.0, 8.0, 4.0,
        0.0, 0.0, 1.0, 1.0,
        0.4, 0.4, 0.4, 0.4,
    ];
    assert!(approx(&draws[0].vertices, &expected), "{:?}", draws[0].vertices);
}

#[test]
fn group_tint_reaches_immediate_content() {
    let mut g = graphics();
    let root = g.root();
    let group = g.create_group_layer();
    g.layers_mut()
        .props_mut(group)
        .set_tint(Color::from_premul(1.0, 0.5, 0.0, 1.0))
        .set_alpha(0.5);
    g.layers_mut().add(root, group);
    let id = g
        .create_immediate_layer(|s: &mut Surface<'_>| {
            s.set_alpha(0.5).fill_rect(0.0, 0.0, 10.0, 10.0);
        })
        .expect("immediate");
    g.layers_mut().add(group, id);

    g.paint_frame(0.016);

    let draws = quad_draws(&g);
    assert_eq!(draws.len(), 1);
    let tint = &draws[0].vertices[14..18];
    assert!(approx(tint, &[0.25, 0.125, 0.0, 0.25]), "{tint:?}");
}

#[test]
fn shared_texture_merges_into_one_draw() {
    let mut g = graphics();
    let tex = texture(&mut g, 4, 4);
    let root = g.root();
    for x in [0.0, 50.0] {
        let id = g.create_image_layer(tex.clone());
        g.layers_mut().props_mut(id).set_translation(x, 0.0);
        g.layers_mut().add(root, id);
    }

    let stats = g.paint_frame(0.016);

    let draws = quad_draws(&g);
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].primitive_count(), 2);
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn texture_change_between_layers_splits_batches() {
    let mut g = graphics();
    let a = texture(&mut g, 4, 4);
    let b = texture(&mut g, 4, 4);
    let root = g.root();
    for tex in [&a, &b, &a] {
        let id = g.create_image_layer(tex.clone());
        g.layers_mut().add(root, id);
    }

    let stats = g.paint_frame(0.016);

    let textures: Vec<_> = quad_draws(&g).iter().map(|d| d.texture).collect();
    assert_eq!(textures, vec![Some(a.id()), Some(b.id()), Some(a.id())]);
    assert_eq!(stats.flushes, 3);
}

#[test]
fn every_frame_clears_first() {
    let mut g = graphics();
    g.set_clear_color(Color::WHITE);
    g.paint_frame(0.016);

    let commands = recorder(&g).commands();
    let bind = commands
        .iter()
        .rposition(|c| matches!(c, Command::BindFramebuffer { .. }))
        .expect("default framebuffer bound");
    assert_eq!(commands[bind + 1..].first(), Some(&Command::SetScissor(None)));
    assert!(commands[bind..].contains(&Command::Clear {
        color: Color::WHITE,
        scissor: None,
    }));
}

#[test]
fn failed_image_degrades_alone() {
    let mut g = graphics();
    let root = g.root();
    let pending = g.create_pending_image_layer(None);
    let tex = texture(&mut g, 2, 2);
    let ok = g.create_image_layer(tex);
    g.layers_mut().add(root, pending);
    g.layers_mut().add(root, ok);

    g.set_image_result(pending, Err(RenderError::exhausted("texture")));
    let stats = g.paint_frame(0.016);

    assert!(g.layers().image(pending).expect("image").is_failed());
    assert_eq!(stats.quads, 1);
}

#[test]
fn pending_image_swaps_placeholder_for_result() {
    let mut g = graphics();
    let placeholder = texture(&mut g, 2, 2);
    let real = texture(&mut g, 16, 16);
    let root = g.root();
    let id = g.create_pending_image_layer(Some(placeholder.clone()));
    g.layers_mut().add(root, id);

    g.paint_frame(0.016);
    assert_eq!(quad_draws(&g).last().and_then(|d| d.texture), Some(placeholder.id()));

    g.set_image_result(id, Ok(real.clone()));
    g.paint_frame(0.016);
    assert_eq!(quad_draws(&g).last().and_then(|d| d.texture), Some(real.id()));
}

#[test]
fn texture_budget_exhaustion_is_recoverable() {
    // The white fill texture takes one slot.
    let mut g = graphics_on(RecordingBackend::new().with_texture_budget(2));
    let _first = texture(&mut g, 4, 4);
    let err = g.create_canvas_layer(10.0, 10.0).err();
    assert!(matches!(err, Some(RenderError::ResourceExhausted { .. })));

    g.paint_frame(0.016);
}

#[test]
fn missing_capabilities_are_reported_at_creation() {
    let caps = BackendCaps {
        immediate_rendering: false,
        framebuffers: false,
        ..BackendCaps::default()
    };
    let mut g = graphics_on(RecordingBackend::with_caps(caps));

    let immediate = g.create_immediate_layer(|_: &mut Surface<'_>| {});
    assert_eq!(immediate.err(), Some(RenderError::Unsupported(Capability::ImmediateRendering)));

    let surface = g.create_surface_layer(10.0, 10.0);
    assert_eq!(surface.err(), Some(RenderError::Unsupported(Capability::Framebuffers)));
}

#[test]
fn clipped_immediate_layer_balances_scissor() {
    let mut g = graphics();
    let root = g.root();
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    let id = g
        .create_clipped_immediate_layer(50.0, 40.0, move |s: &mut Surface<'_>| {
            seen.set(seen.get() + 1);
            s.set_fill_color(Color::BLACK).fill_rect(0.0, 0.0, 100.0, 100.0);
        })
        .expect("immediate");
    g.layers_mut().props_mut(id).set_translation(10.0, 10.0);
    g.layers_mut().add(root, id);

    g.paint_frame(0.016);

    assert_eq!(calls.get(), 1);
    assert_eq!(g.context().clip_depth(), 0);
    let draws = recorder(&g).draws();
    let clipped = Some(Scissor::new(10, 10, 50, 40));
    assert!(draws.iter().any(|d| d.scissor == clipped));

    let scissors: Vec<_> = recorder(&g)
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::SetScissor(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(scissors.last(), Some(&None));
}

#[test]
fn clear_inside_clipped_immediate_layer_keeps_its_scissor() {
    let mut g = graphics();
    let root = g.root();
    let tex = texture(&mut g, 2, 2);
    let backdrop = g.create_image_layer(tex);
    g.layers_mut().add(root, backdrop);

    let tint = Color::from_straight(0.0, 0.0, 1.0, 1.0);
    let id = g
        .create_clipped_immediate_layer(50.0, 40.0, move |s: &mut Surface<'_>| {
            s.clear(tint);
        })
        .expect("immediate");
    g.layers_mut().props_mut(id).set_translation(10.0, 10.0);
    g.layers_mut().add(root, id);

    g.paint_frame(0.016);

    let commands = recorder(&g).commands();
    let backdrop_draw = commands.iter().position(|c| matches!(c, Command::Draw(_)));
    let clipped_clear = commands.iter().position(|c| {
        *c == Command::Clear {
            color: tint,
            scissor: Some(Scissor::new(10, 10, 50, 40)),
        }
    });
    assert!(backdrop_draw.is_some());
    assert!(clipped_clear > backdrop_draw, "{commands:?}");
    let unclipped_clears = commands
        .iter()
        .filter(|c| matches!(c, Command::Clear { scissor: None, .. }))
        .count();
    assert_eq!(unclipped_clears, 1, "only the frame clear spans the target");
}

#[test]
fn offscreen_immediate_clip_skips_renderer() {
    let mut g = graphics();
    let root = g.root();
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    let id = g
        .create_clipped_immediate_layer(10.0, 10.0, move |_: &mut Surface<'_>| {
            seen.set(seen.get() + 1)
        })
        .expect("immediate");
    g.layers_mut().props_mut(id).set_translation(500.0, 500.0);
    g.layers_mut().add(root, id);

    g.paint_frame(0.016);

    assert_eq!(calls.get(), 0);
    assert_eq!(g.context().clip_depth(), 0);
}

#[test]
fn surface_layer_renders_offscreen_then_composites() {
    let mut g = graphics();
    let root = g.root();
    let id = g.create_surface_layer(32.0, 16.0).expect("surface");
    g.layers_mut().add(root, id);
    let surface_texture = g.layers().surface(id).expect("surface").texture().id();

    g.draw_surface(id, |s| {
        s.clear(Color::TRANSPARENT);
        s.set_fill_color(Color::WHITE).draw_line(0.0, 8.0, 32.0, 8.0, 2.0);
    });
    g.paint_frame(0.016);

    let draws = quad_draws(&g);
    assert_eq!(draws.len(), 2);
    assert_ne!(draws[0].framebuffer, draws[1].framebuffer);
    assert_eq!(draws[1].texture, Some(surface_texture));
    assert_eq!(g.context().current_framebuffer(), g.context().default_framebuffer());
}

#[test]
fn canvas_uploads_only_after_changes() {
    let mut g = graphics();
    let root = g.root();
    let id = g.create_canvas_layer(8.0, 8.0).expect("canvas");
    g.layers_mut().add(root, id);
    let tex = g.layers_mut().canvas_mut(id).expect("canvas").texture().id();
    let uploads = |g: &Graphics| {
        recorder(g)
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::UploadTexture { id, .. } if *id == tex))
            .count()
    };

    g.paint_frame(0.016);
    g.paint_frame(0.016);
    assert_eq!(uploads(&g), 1);

    g.layers_mut()
        .canvas_mut(id)
        .expect("canvas")
        .canvas_mut()
        .fill_rect(Rect::from_size(4.0, 4.0), Color::BLACK);
    g.paint_frame(0.016);
    assert_eq!(uploads(&g), 2);
}

#[test]
fn update_hooks_run_even_when_hidden() {
    let mut g = graphics();
    let root = g.root();
    let id = g.create_group_layer();
    g.layers_mut().add(root, id);
    g.layers_mut().props_mut(id).set_visible(false);

    let elapsed = Rc::new(Cell::new(0.0f32));
    let sink = Rc::clone(&elapsed);
    g.layers_mut().set_update_hook(id, move |dt| sink.set(sink.get() + dt));

    g.paint_frame(0.5);
    g.paint_frame(0.25);
    assert_eq!(elapsed.get(), 0.75);
}

#[test]
fn destroyed_layers_release_their_textures() {
    let mut g = graphics();
    let root = g.root();
    let id = g.create_canvas_layer(8.0, 8.0).expect("canvas");
    g.layers_mut().add(root, id);
    let tex = g.layers_mut().canvas_mut(id).expect("canvas").texture().id();

    g.paint_frame(0.016);
    g.destroy_layer(id);
    g.paint_frame(0.016);

    assert!(!recorder(&g).is_texture_live(tex));
    assert!(g.layers().children(root).is_empty());
}

#[test]
fn uploaded_pixels_become_a_texture() {
    let mut g = graphics();
    let pixels = [255u8; 2 * 2 * 4];
    let data = PixelData::validated(&pixels, 2, 2, PixelFormat::Rgba8).expect("pixels");
    let tex = g.upload_texture(&data).expect("upload");
    assert_eq!((tex.width(), tex.height()), (2, 2));

    let short = PixelData::validated(&pixels[..5], 2, 2, PixelFormat::Rgba8);
    assert!(matches!(short, Err(RenderError::InvalidPixels { .. })));
}

#[test]
fn hit_test_uses_logical_points() {
    let mut g = graphics();
    let root = g.root();
    let tex = texture(&mut g, 10, 10);
    let id = g.create_image_layer(tex);
    g.layers_mut().add(root, id);
    g.layers_mut().props_mut(id).set_translation(20.0, 20.0);

    assert_eq!(g.hit_test(Vec2::new(25.0, 25.0)), Some(id));
    assert_eq!(g.hit_test(Vec2::new(5.0, 5.0)), None);
}

#[test]
fn destroy_returns_a_clean_backend() {
    let mut g = graphics();
    let root = g.root();
    let id = g.create_canvas_layer(4.0, 4.0).expect("canvas");
    g.layers_mut().add(root, id);
    g.paint_frame(0.016);

    let backend = g.destroy();
    let recording = backend.as_any().downcast_ref::<RecordingBackend>().expect("recording backend");
    assert_eq!(recording.live_textures(), 0);
}
