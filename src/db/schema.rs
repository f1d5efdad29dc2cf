pub const SCHEMA: &str = r#"
-- Users: only the identity and persisted search filter are read by search
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    search_filter TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Tag catalog
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    uploader_id INTEGER NOT NULL DEFAULT 0,
    upload_time TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    aliased_id INTEGER NOT NULL DEFAULT 0,   -- 0 when the tag is not an alias
    is_alias INTEGER NOT NULL DEFAULT 0
);

-- Images and their searchable meta-columns
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    location TEXT NOT NULL,
    uploader_id INTEGER NOT NULL DEFAULT 0,
    upload_time TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    rating TEXT NOT NULL DEFAULT 'unrated',
    score_average INTEGER NOT NULL DEFAULT 0,
    score_total INTEGER NOT NULL DEFAULT 0,
    score_voters INTEGER NOT NULL DEFAULT 0,
    source TEXT
);

CREATE INDEX IF NOT EXISTS idx_images_uploader ON images(uploader_id);
CREATE INDEX IF NOT EXISTS idx_images_rating ON images(rating);

-- Image to tag association
CREATE TABLE IF NOT EXISTS image_tags (
    image_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    linker_id INTEGER NOT NULL DEFAULT 0,
    linked_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (image_id, tag_id),
    FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_image_tags_tag ON image_tags(tag_id);

-- Collections: ordered groups of images
CREATE TABLE IF NOT EXISTS collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    uploader_id INTEGER NOT NULL DEFAULT 0,
    upload_time TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS collection_members (
    collection_id INTEGER NOT NULL,
    image_id INTEGER NOT NULL,
    order_weight INTEGER NOT NULL DEFAULT 0,
    linker_id INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (collection_id, image_id),
    FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE,
    FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_collection_members_image ON collection_members(image_id);

-- A collection carries every tag carried by any of its members
CREATE VIEW IF NOT EXISTS collection_tags AS
    SELECT DISTINCT cm.collection_id AS collection_id, it.tag_id AS tag_id
    FROM collection_members cm
    JOIN image_tags it ON it.image_id = cm.image_id;

-- Perceptual hash pair (horizontal and vertical gradient), 64 bits each
CREATE TABLE IF NOT EXISTS imaged_hashes (
    image_id INTEGER PRIMARY KEY,
    h_hash INTEGER NOT NULL,
    v_hash INTEGER NOT NULL,
    hashed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE
);
"#;
