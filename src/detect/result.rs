use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

macro_rules! object_classes {
    ($($variant:ident => $label:literal),+ $(,)?) => {
        /// Object classes the detector can report (the 80 COCO classes).
        ///
        /// `Unknown` is the sentinel for labels the model emitted but we could not map;
        /// the filter always drops it.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ObjectClass {
            $($variant,)+
            Unknown,
        }

        impl ObjectClass {
            /// Every known class, in model index order.
            pub const ALL: &'static [ObjectClass] = &[$(ObjectClass::$variant),+];

            /// Human-readable label, as the model names it.
            pub fn label(self) -> &'static str {
                match self {
                    $(ObjectClass::$variant => $label,)+
                    ObjectClass::Unknown => "unknown",
                }
            }
        }
    };
}

object_classes! {
    Person => "person",
    Bicycle => "bicycle",
    Car => "car",
    Motorcycle => "motorcycle",
    Airplane => "airplane",
    Bus => "bus",
    Train => "train",
    Truck => "truck",
    Boat => "boat",
    TrafficLight => "traffic light",
    FireHydrant => "fire hydrant",
    StopSign => "stop sign",
    ParkingMeter => "parking meter",
    Bench => "bench",
    Bird => "bird",
    Cat => "cat",
    Dog => "dog",
    Horse => "horse",
    Sheep => "sheep",
    Cow => "cow",
    Elephant => "elephant",
    Bear => "bear",
    Zebra => "zebra",
    Giraffe => "giraffe",
    Backpack => "backpack",
    Umbrella => "umbrella",
    Handbag => "handbag",
    Tie => "tie",
    Suitcase => "suitcase",
    Frisbee => "frisbee",
    Skis => "skis",
    Snowboard => "snowboard",
    SportsBall => "sports ball",
    Kite => "kite",
    BaseballBat => "baseball bat",
    BaseballGlove => "baseball glove",
    Skateboard => "skateboard",
    Surfboard => "surfboard",
    TennisRacket => "tennis racket",
    Bottle => "bottle",
    WineGlass => "wine glass",
    Cup => "cup",
    Fork => "fork",
    Knife => "knife",
    Spoon => "spoon",
    Bowl => "bowl",
    Banana => "banana",
    Apple => "apple",
    Sandwich => "sandwich",
    Orange => "orange",
    Broccoli => "broccoli",
    Carrot => "carrot",
    HotDog => "hot dog",
    Pizza => "pizza",
    Donut => "donut",
    Cake => "cake",
    Chair => "chair",
    Couch => "couch",
    PottedPlant => "potted plant",
    Bed => "bed",
    DiningTable => "dining table",
    Toilet => "toilet",
    Tv => "tv",
    Laptop => "laptop",
    Mouse => "mouse",
    Remote => "remote",
    Keyboard => "keyboard",
    CellPhone => "cell phone",
    Microwave => "microwave",
    Oven => "oven",
    Toaster => "toaster",
    Sink => "sink",
    Refrigerator => "refrigerator",
    Book => "book",
    Clock => "clock",
    Vase => "vase",
    Scissors => "scissors",
    TeddyBear => "teddy bear",
    HairDrier => "hair drier",
    Toothbrush => "toothbrush",
}

impl ObjectClass {
    /// Map a model output index; out-of-range indices become `Unknown`.
    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or(ObjectClass::Unknown)
    }

    /// Map a model label, accepting `_`/`-` for spaces and any letter case.
    /// Unmappable labels become `Unknown` rather than an error.
    pub fn from_label(label: &str) -> Self {
        let wanted = canonical_label(label);
        Self::ALL
            .iter()
            .copied()
            .find(|class| class.label() == wanted)
            .unwrap_or(ObjectClass::Unknown)
    }

    /// Label with the first letter capitalized, for notifications.
    pub fn display_name(self) -> String {
        let label = self.label();
        let mut chars = label.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// File-name friendly label (`cell phone` -> `cell_phone`).
    pub fn slug(self) -> String {
        self.label().replace(' ', "_")
    }
}

fn canonical_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Strict parse used for configuration: a typo is an error, not `Unknown`.
impl FromStr for ObjectClass {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match ObjectClass::from_label(value) {
            ObjectClass::Unknown => Err(anyhow!("unknown object class '{}'", value.trim())),
            class => Ok(class),
        }
    }
}

/// Where the normalized coordinate system of a bounding box has its origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoxOrigin {
    /// Image convention: (0,0) is the top-left corner, y grows downwards.
    #[default]
    TopLeft,
    /// Vision-framework convention: (0,0) is the bottom-left corner, y grows upwards.
    BottomLeft,
}

/// Normalized rectangle, all components in [0,1].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub origin: BoxOrigin,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            origin: BoxOrigin::TopLeft,
        }
    }

    pub fn with_origin(mut self, origin: BoxOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Box center in image (top-left origin) coordinates, the system zones use.
    pub fn center_in_image(&self) -> (f32, f32) {
        let cx = self.x + self.w / 2.0;
        let cy = self.y + self.h / 2.0;
        match self.origin {
            BoxOrigin::TopLeft => (cx, cy),
            BoxOrigin::BottomLeft => (cx, 1.0 - cy),
        }
    }

    /// Same box expressed with a top-left origin.
    pub fn to_top_left(&self) -> Self {
        match self.origin {
            BoxOrigin::TopLeft => *self,
            BoxOrigin::BottomLeft => Self::new(self.x, 1.0 - self.y - self.h, self.w, self.h),
        }
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    /// Intersection over union; both boxes are compared in top-left coordinates.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let a = self.to_top_left();
        let b = other.to_top_left();
        let left = a.x.max(b.x);
        let top = a.y.max(b.y);
        let right = (a.x + a.w).min(b.x + b.w);
        let bottom = (a.y + a.h).min(b.y + b.h);
        let inter = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = a.area() + b.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One detected object. Produced fresh per frame, never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class: ObjectClass,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: ObjectClass, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class,
            confidence,
            bbox,
        }
    }

    /// "Person detected, 87% confidence"
    pub fn summary(&self) -> String {
        format!(
            "{} detected, {}% confidence",
            self.class.display_name(),
            (self.confidence * 100.0).round() as i32
        )
    }
}
