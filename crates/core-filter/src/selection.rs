/// How a 2D drag delta is interpreted as a change to the bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
    FloatScale,
    FloatTranslate,
    Point3DTranslate,
    Point3DScale,
    Point3DRotate,
    Point3DRotateLockedMagnitude,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MouseButtonMask: u8 {
        const LEFT   = 0b001;
        const MIDDLE = 0b010;
        const RIGHT  = 0b100;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModifierMask: u8 {
        const SHIFT = 0b001;
        const CTRL  = 0b010;
        const ALT   = 0b100;
    }
}

/// Couples a drawable to a particular internal parameter of the filter that
/// produced it. Given a 2D drag vector, the viewer (`core-viz`) projects it
/// into 3D using the camera basis and applies the resulting delta through
/// `action_id`, which names an operation `Filter::set_property`-adjacent
/// code on the target filter understands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionBinding {
    pub mouse_buttons: MouseButtonMask,
    pub modifiers: ModifierMask,
    pub mode: InteractionMode,
    pub scalar_min: f32,
    pub scalar_max: f32,
    pub target_node: u64,
    pub action_id: u32,
}

impl SelectionBinding {
    /// Bindings with a longer (more specific) modifier mask outrank shorter
    /// ones when more than one binding matches the same drag gesture.
    pub fn specificity(&self) -> u32 {
        self.modifiers.bits().count_ones()
    }
}

/// The set of bindings a single refresh attached to one drawable.
#[derive(Debug, Clone, Default)]
pub struct SelectionDevice {
    pub bindings: Vec<SelectionBinding>,
}

impl SelectionDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// The binding that should win for a drag with the given buttons/modifiers
    /// held, preferring the most specific (longest) modifier mask among
    /// those whose button mask matches.
    pub fn resolve(&self, buttons: MouseButtonMask, modifiers: ModifierMask) -> Option<&SelectionBinding> {
        self.bindings
            .iter()
            .filter(|b| b.mouse_buttons.intersects(buttons) && modifiers.contains(b.modifiers))
            .max_by_key(|b| b.specificity())
    }
}
